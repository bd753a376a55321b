use camino::Utf8PathBuf;
use serde_json::{Value, json};

use crate::error::CrawlError;
use crate::store::Store;

/// A cached answer: the payload, or a remembered "registry has no record".
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Found(Value),
    NotFound,
}

impl CacheEntry {
    pub fn into_metadata(self) -> Option<Value> {
        match self {
            CacheEntry::Found(value) => Some(value),
            CacheEntry::NotFound => None,
        }
    }

    fn from_value(value: Value) -> Self {
        let not_found = value
            .get("notFound")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if not_found {
            CacheEntry::NotFound
        } else {
            CacheEntry::Found(value)
        }
    }
}

/// `externalCache/<registry>/<key>.json`. Entries never expire.
#[derive(Debug, Clone)]
pub struct ExternalCache {
    dir: Utf8PathBuf,
}

impl ExternalCache {
    pub fn new(store: &Store, registry: &str) -> Self {
        Self {
            dir: store.external_cache_dir(registry),
        }
    }

    pub fn path(&self, key: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", file_safe(key)))
    }

    pub fn read(&self, key: &str) -> Result<Option<CacheEntry>, CrawlError> {
        let path = self.path(key);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let value: Value = Store::read_json(&path)?;
        Ok(Some(CacheEntry::from_value(value)))
    }

    pub fn write_found(&self, key: &str, value: &Value) -> Result<(), CrawlError> {
        Store::write_json(&self.path(key), value)
    }

    pub fn write_not_found(&self, key: &str) -> Result<(), CrawlError> {
        Store::write_json(&self.path(key), &json!({"accession": key, "notFound": true}))
    }
}

fn file_safe(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_and_payload_entries() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let cache = ExternalCache::new(&Store::new_with_root(root), "jga");

        assert_eq!(cache.read("JGAD000001").unwrap(), None);

        cache.write_not_found("JGAD000001").unwrap();
        assert_eq!(cache.read("JGAD000001").unwrap(), Some(CacheEntry::NotFound));

        let payload = json!({"identifier": "JGAD000002", "title": "WGS"});
        cache.write_found("JGAD000002", &payload).unwrap();
        assert_eq!(
            cache.read("JGAD000002").unwrap().and_then(CacheEntry::into_metadata),
            Some(payload)
        );
        assert!(cache.path("a/b").ends_with("a_b.json"));
    }
}
