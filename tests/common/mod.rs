#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use humandbs_crawler::http::{HttpGet, HttpResponse};
use humandbs_crawler::store::Store;

/// Canned responses by exact URL; anything else is a 404. Every request is
/// logged.
#[derive(Default)]
pub struct MockHttp {
    responses: HashMap<String, (u16, String)>,
    calls: Mutex<Vec<String>>,
}

impl MockHttp {
    pub fn with(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }
}

impl HttpGet for MockHttp {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        self.calls.lock().unwrap().push(url.to_string());
        let (status, body) = self
            .responses
            .get(url)
            .cloned()
            .unwrap_or((404, "Not Found".to_string()));
        Ok(HttpResponse { status, body })
    }
}

pub fn temp_store() -> (TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    (temp, Store::new_with_root(root))
}
