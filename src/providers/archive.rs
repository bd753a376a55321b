use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::{Archive, archive_for};
use crate::error::CrawlError;
use crate::http::HttpGet;
use crate::providers::cache::ExternalCache;
use crate::providers::{Lookup, Source, Throttle, run_batch};
use crate::store::Store;

pub const DEFAULT_REGISTRY_BASE: &str = "https://ddbj.nig.ac.jp/search";

static SRA_ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[DES]R([APXRSZ])\d+$").expect("valid SRA accession pattern"));
static JGA_ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^JGA([SDPC])\d+$").expect("valid JGA accession pattern"));

/// The two DDBJ archives behind the same entry API. They differ in how
/// accessions route to entry types and in how payloads are wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Sra,
    Jga,
}

impl ArchiveKind {
    pub fn registry(&self) -> &'static str {
        match self {
            ArchiveKind::Sra => "sra",
            ArchiveKind::Jga => "jga",
        }
    }

    /// Entry type for an accession, or `None` when this archive does not
    /// hold it.
    pub fn entry_type(&self, accession: &str) -> Option<&'static str> {
        let accession = accession.trim();
        match self {
            ArchiveKind::Sra => {
                let caps = SRA_ACCESSION_RE.captures(accession)?;
                match caps.get(1)?.as_str() {
                    "A" => Some("sra-submission"),
                    "P" => Some("sra-study"),
                    "X" => Some("sra-experiment"),
                    "R" => Some("sra-run"),
                    "S" => Some("sra-sample"),
                    "Z" => Some("sra-analysis"),
                    _ => None,
                }
            }
            ArchiveKind::Jga => {
                let caps = JGA_ACCESSION_RE.captures(accession)?;
                match caps.get(1)?.as_str() {
                    "S" => Some("jga-study"),
                    "D" => Some("jga-dataset"),
                    "P" => Some("jga-policy"),
                    "C" => Some("jga-dac"),
                    _ => None,
                }
            }
        }
    }

    /// Drops the search-index wrapper each archive puts around its document.
    fn unwrap_payload(&self, value: Value) -> Value {
        let key = match self {
            ArchiveKind::Sra => "_source",
            ArchiveKind::Jga => "properties",
        };
        match value {
            Value::Object(mut map) => match map.remove(key) {
                Some(inner @ Value::Object(_)) => inner,
                Some(other) => {
                    map.insert(key.to_string(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            },
            other => other,
        }
    }
}

pub struct ArchiveClient<H: HttpGet> {
    kind: ArchiveKind,
    base_url: String,
    http: H,
    cache: ExternalCache,
}

impl<H: HttpGet> ArchiveClient<H> {
    pub fn new(kind: ArchiveKind, http: H, store: &Store, base_url: &str) -> Self {
        Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            cache: ExternalCache::new(store, kind.registry()),
        }
    }

    pub fn entry_url(&self, entry_type: &str, accession: &str) -> String {
        format!("{}/entry/{entry_type}/{accession}.json", self.base_url)
    }

    pub fn get(&self, accession: &str, use_cache: bool) -> Result<Lookup, CrawlError> {
        let accession = accession.trim();
        let Some(entry_type) = self.kind.entry_type(accession) else {
            return Ok(Lookup::unroutable());
        };
        if use_cache {
            if let Some(entry) = self.cache.read(accession)? {
                tracing::debug!(registry = self.kind.registry(), accession, "cache hit");
                return Ok(Lookup {
                    metadata: entry.into_metadata(),
                    source: Source::Cache,
                });
            }
        }

        let registry = self.kind.registry();
        let url = self.entry_url(entry_type, accession);
        let response = self
            .http
            .get(&url)
            .map_err(|message| CrawlError::RegistryHttp {
                registry: registry.to_string(),
                message,
            })?;
        if response.status == 404 {
            tracing::debug!(registry, accession, "not in registry");
            self.cache.write_not_found(accession)?;
            return Ok(Lookup {
                metadata: None,
                source: Source::Network,
            });
        }
        if !response.is_success() {
            return Err(CrawlError::RegistryStatus {
                registry: registry.to_string(),
                status: response.status,
                message: snippet(&response.body),
            });
        }
        let value: Value =
            serde_json::from_str(&response.body).map_err(|err| CrawlError::RegistryHttp {
                registry: registry.to_string(),
                message: format!("invalid JSON for {accession}: {err}"),
            })?;
        let value = self.kind.unwrap_payload(value);
        self.cache.write_found(accession, &value)?;
        Ok(Lookup {
            metadata: Some(value),
            source: Source::Network,
        })
    }
}

/// Lookup of dataset metadata by dataset id, whichever archive holds it.
pub trait DatasetLookup {
    fn lookup_batch(&self, dataset_ids: &[String], use_cache: bool) -> Vec<Result<Lookup, CrawlError>>;
}

/// Both archives, dispatched by dataset-id convention.
pub struct Archives<H: HttpGet> {
    pub sra: ArchiveClient<H>,
    pub jga: ArchiveClient<H>,
    throttle: Throttle,
}

impl<H: HttpGet> Archives<H> {
    pub fn new(sra: ArchiveClient<H>, jga: ArchiveClient<H>, throttle: Throttle) -> Self {
        Self { sra, jga, throttle }
    }

    pub fn get(&self, dataset_id: &str, use_cache: bool) -> Result<Lookup, CrawlError> {
        match archive_for(dataset_id) {
            Some(Archive::Sequence) => self.sra.get(dataset_id, use_cache),
            Some(Archive::Genotype) => self.jga.get(dataset_id, use_cache),
            None => Ok(Lookup::unroutable()),
        }
    }
}

impl<H: HttpGet> DatasetLookup for Archives<H> {
    fn lookup_batch(&self, dataset_ids: &[String], use_cache: bool) -> Vec<Result<Lookup, CrawlError>> {
        run_batch(dataset_ids, self.throttle, |id| self.get(id, use_cache))
    }
}

fn snippet(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sra_prefix_routing() {
        let sra = ArchiveKind::Sra;
        assert_eq!(sra.entry_type("DRA000908"), Some("sra-submission"));
        assert_eq!(sra.entry_type("SRP000001"), Some("sra-study"));
        assert_eq!(sra.entry_type("ERX123"), Some("sra-experiment"));
        assert_eq!(sra.entry_type("DRR000001"), Some("sra-run"));
        assert_eq!(sra.entry_type("DRS000001"), Some("sra-sample"));
        assert_eq!(sra.entry_type("DRZ000001"), Some("sra-analysis"));
        assert_eq!(sra.entry_type("JGAD000001"), None);
    }

    #[test]
    fn jga_prefix_routing() {
        let jga = ArchiveKind::Jga;
        assert_eq!(jga.entry_type("JGAS000001"), Some("jga-study"));
        assert_eq!(jga.entry_type("JGAD000001"), Some("jga-dataset"));
        assert_eq!(jga.entry_type("JGAP000001"), Some("jga-policy"));
        assert_eq!(jga.entry_type("JGAC000001"), Some("jga-dac"));
        assert_eq!(jga.entry_type("JGAX000001"), None);
        assert_eq!(jga.entry_type("DRA000908"), None);
    }

    #[test]
    fn payload_shapes_differ_per_archive() {
        let sra = ArchiveKind::Sra.unwrap_payload(json!({"_source": {"identifier": "DRA1"}, "_id": "x"}));
        assert_eq!(sra, json!({"identifier": "DRA1"}));

        let jga = ArchiveKind::Jga.unwrap_payload(json!({"properties": {"identifier": "JGAD1"}}));
        assert_eq!(jga, json!({"identifier": "JGAD1"}));

        let plain = ArchiveKind::Jga.unwrap_payload(json!({"identifier": "JGAD1"}));
        assert_eq!(plain, json!({"identifier": "JGAD1"}));
    }

    #[test]
    fn long_error_bodies_are_cut() {
        let body = "x".repeat(500);
        assert_eq!(snippet(&body).chars().count(), 201);
        assert_eq!(snippet(" short "), "short");
    }
}
