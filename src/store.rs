use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{HumId, HumVersionId, Lang};
use crate::error::CrawlError;

/// Kinds of portal pages kept in the HTML cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Detail,
    Release,
}

impl PageKind {
    fn dir_name(&self) -> &'static str {
        match self {
            PageKind::Detail => "detail",
            PageKind::Release => "release",
        }
    }
}

/// Kinds of built records kept in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Research,
    Version,
    Dataset,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Research => "research",
            RecordKind::Version => "version",
            RecordKind::Dataset => "dataset",
        }
    }
}

/// On-disk layout of everything the pipeline persists. File names derive
/// from the lookup key, so a path doubles as the idempotency key.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, CrawlError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("humandbs-crawler"))
                    .ok()
            })
            .ok_or_else(|| {
                CrawlError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn home_page_path(&self, lang: Lang) -> Utf8PathBuf {
        self.root.join("html").join(format!("home-{lang}.html"))
    }

    pub fn page_dir(&self, kind: PageKind) -> Utf8PathBuf {
        self.root.join("html").join(kind.dir_name())
    }

    pub fn page_path(&self, kind: PageKind, id: &HumVersionId, lang: Lang) -> Utf8PathBuf {
        self.page_dir(kind).join(format!("{id}-{lang}.html"))
    }

    pub fn external_cache_dir(&self, registry: &str) -> Utf8PathBuf {
        self.root.join("externalCache").join(registry)
    }

    pub fn record_dir(&self, kind: RecordKind) -> Utf8PathBuf {
        self.root.join("records").join(kind.as_str())
    }

    pub fn record_path(&self, kind: RecordKind, id: &str) -> Utf8PathBuf {
        self.record_dir(kind).join(format!("{id}.json"))
    }

    /// humIds that have at least one cached detail page, sorted.
    pub fn cached_hum_ids(&self) -> Result<Vec<HumId>, CrawlError> {
        let mut ids = self
            .cached_detail_pages()?
            .into_iter()
            .map(|(id, _)| id.hum_id().clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Cached detail pages as `(humVersionId, lang)` pairs.
    pub fn cached_detail_pages(&self) -> Result<Vec<(HumVersionId, Lang)>, CrawlError> {
        let dir = self.page_dir(PageKind::Detail);
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut pages = Vec::new();
        for path in walk_dir(dir.as_std_path())? {
            let Some(stem) = path.file_stem().and_then(|value| value.to_str()) else {
                continue;
            };
            let Some((id, lang)) = stem.rsplit_once('-') else {
                continue;
            };
            if let (Ok(id), Ok(lang)) = (id.parse::<HumVersionId>(), lang.parse::<Lang>()) {
                pages.push((id, lang));
            }
        }
        pages.sort();
        Ok(pages)
    }

    pub fn read_cached(path: &Utf8Path) -> Result<Option<String>, CrawlError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        fs::read_to_string(path.as_std_path())
            .map(Some)
            .map_err(|err| CrawlError::Filesystem(format!("read {path}: {err}")))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CrawlError> {
        let parent = path
            .parent()
            .ok_or_else(|| CrawlError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CrawlError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".humandbs-write")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CrawlError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut temp, content)
            .map_err(|err| CrawlError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CrawlError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_json<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<(), CrawlError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| CrawlError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, CrawlError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CrawlError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| CrawlError::Filesystem(format!("decode {path}: {err}")))
    }

    /// Loads every record of one kind, sorted by file name.
    pub fn list_records<T: DeserializeOwned>(&self, kind: RecordKind) -> Result<Vec<T>, CrawlError> {
        let dir = self.record_dir(kind);
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut paths = walk_dir(dir.as_std_path())?
            .into_iter()
            .filter(|path| path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect::<Vec<_>>();
        paths.sort();
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let path = Utf8PathBuf::from_path_buf(path)
                .map_err(|_| CrawlError::Filesystem("non-utf8 record path".to_string()))?;
            records.push(Self::read_json(&path)?);
        }
        Ok(records)
    }

}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, CrawlError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| CrawlError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| CrawlError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    Ok(items)
}
