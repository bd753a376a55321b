//! Checks run on records before they leave the pipeline, and the sink seam
//! they leave through.

use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;

use crate::error::CrawlError;
use crate::model::{Dataset, HumVersion, Research};
use crate::parse::detail::normalize_doi;
use crate::store::{RecordKind, Store};

static DATASET_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+$").expect("valid dataset version pattern"));
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A record that can be checked and handed to an index.
pub trait Validate: Serialize {
    const KIND: RecordKind;

    fn record_id(&self) -> String;

    fn validate(&self) -> Vec<Violation>;
}

fn check_date(path: &str, value: Option<&str>, out: &mut Vec<Violation>) {
    if let Some(value) = value {
        if !ISO_DATE_RE.is_match(value) {
            out.push(Violation::new(path, format!("{value:?} is not YYYY-MM-DD")));
        }
    }
}

impl Validate for Research {
    const KIND: RecordKind = RecordKind::Research;

    fn record_id(&self) -> String {
        self.hum_id.to_string()
    }

    fn validate(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.title.is_empty() {
            out.push(Violation::new("title", "no title in either language"));
        }
        if self.versions.is_empty() {
            out.push(Violation::new("versions", "no versions"));
        }
        for (idx, version) in self.versions.iter().enumerate() {
            if version.hum_version_id.hum_id() != &self.hum_id {
                out.push(Violation::new(
                    format!("versions[{idx}]"),
                    format!("{} belongs to another project", version.hum_version_id),
                ));
            }
            check_date(
                &format!("versions[{idx}].releaseDate"),
                version.release_date.as_deref(),
                &mut out,
            );
        }
        for (idx, publication) in self.publications.iter().enumerate() {
            if let Some(doi) = &publication.doi {
                if normalize_doi(doi).as_deref() != Some(doi.as_str()) {
                    out.push(Violation::new(
                        format!("publications[{idx}].doi"),
                        format!("{doi:?} is not a bare DOI"),
                    ));
                }
            }
        }
        out
    }
}

impl Validate for HumVersion {
    const KIND: RecordKind = RecordKind::Version;

    fn record_id(&self) -> String {
        self.hum_version_id.to_string()
    }

    fn validate(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.hum_version_id.hum_id() != &self.hum_id {
            out.push(Violation::new("humId", "does not match humVersionId"));
        }
        if self.hum_version_id.version() != self.version {
            out.push(Violation::new("version", "does not match humVersionId"));
        }
        check_date("releaseDate", self.release_date.as_deref(), &mut out);
        for (idx, dataset) in self.datasets.iter().enumerate() {
            if !DATASET_VERSION_RE.is_match(&dataset.version) {
                out.push(Violation::new(
                    format!("datasets[{idx}].version"),
                    format!("{:?} is not v<n>", dataset.version),
                ));
            }
        }
        out
    }
}

impl Validate for Dataset {
    const KIND: RecordKind = RecordKind::Dataset;

    fn record_id(&self) -> String {
        Dataset::record_id(self)
    }

    fn validate(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.dataset_id.trim().is_empty() {
            out.push(Violation::new("datasetId", "empty"));
        }
        if !DATASET_VERSION_RE.is_match(&self.version) {
            out.push(Violation::new("version", format!("{:?} is not v<n>", self.version)));
        }
        if self.hum_version_ids.is_empty() {
            out.push(Violation::new("humVersionIds", "no owning hum version"));
        }
        for (idx, id) in self.hum_version_ids.iter().enumerate() {
            if id.hum_id() != &self.hum_id {
                out.push(Violation::new(
                    format!("humVersionIds[{idx}]"),
                    format!("{id} belongs to another project"),
                ));
            }
        }
        check_date("releaseDate", self.release_date.as_deref(), &mut out);
        out
    }
}

/// Where validated records are written for indexing.
pub trait IndexSink {
    fn write(&self, kind: RecordKind, id: &str, document: &serde_json::Value) -> Result<(), CrawlError>;
}

/// `<out>/<kind>/<id>.json`, one file per record.
pub struct JsonDirSink {
    root: Utf8PathBuf,
}

impl JsonDirSink {
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn path(&self, kind: RecordKind, id: &str) -> Utf8PathBuf {
        self.root.join(kind.as_str()).join(format!("{id}.json"))
    }
}

impl IndexSink for JsonDirSink {
    fn write(&self, kind: RecordKind, id: &str, document: &serde_json::Value) -> Result<(), CrawlError> {
        Store::write_json(&self.path(kind, id), document)
    }
}

/// Validates `record` and writes it to `sink`. A record with violations is
/// rejected and nothing is written.
pub fn handoff<T: Validate>(sink: &dyn IndexSink, record: &T) -> Result<(), CrawlError> {
    let id = record.record_id();
    let violations = record.validate();
    if !violations.is_empty() {
        return Err(CrawlError::SchemaValidation {
            kind: T::KIND.as_str().to_string(),
            id,
            violations: violations.iter().map(Violation::to_string).collect(),
        });
    }
    let document = serde_json::to_value(record)
        .map_err(|err| CrawlError::Filesystem(format!("encode {id}: {err}")))?;
    sink.write(T::KIND, &id, &document)
}
