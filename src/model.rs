//! Records produced by the builder and consumed by reconciliation,
//! enrichment and the index sink.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{HumId, HumVersionId, Lang};
use crate::parse::TextValue;
use crate::parse::detail::{ControlledAccessUser, DataProvider, Summary};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bilingual<T> {
    pub ja: T,
    pub en: T,
}

impl<T> Bilingual<T> {
    pub fn new(ja: T, en: T) -> Self {
        Self { ja, en }
    }

    pub fn get(&self, lang: Lang) -> &T {
        match lang {
            Lang::Ja => &self.ja,
            Lang::En => &self.en,
        }
    }

    pub fn get_mut(&mut self, lang: Lang) -> &mut T {
        match lang {
            Lang::Ja => &mut self.ja,
            Lang::En => &mut self.en,
        }
    }
}

impl<T> Bilingual<Option<T>> {
    /// English value when present, otherwise Japanese.
    pub fn preferred(&self) -> Option<&T> {
        self.en.as_ref().or(self.ja.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.ja.is_none() && self.en.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Research {
    pub hum_id: HumId,
    pub title: Bilingual<Option<String>>,
    pub summary: Bilingual<Option<Summary>>,
    pub data_provider: Bilingual<Option<DataProvider>>,
    pub publications: Vec<Publication>,
    pub controlled_access_users: Bilingual<Vec<ControlledAccessUser>>,
    pub versions: Vec<VersionRef>,
}

impl Research {
    pub fn latest_version(&self) -> Option<&VersionRef> {
        self.versions.iter().max_by_key(|entry| entry.hum_version_id.version())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRef {
    pub hum_version_id: HumVersionId,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub title: Bilingual<Option<String>>,
    pub doi: Option<String>,
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumVersion {
    pub hum_version_id: HumVersionId,
    pub hum_id: HumId,
    pub version: u32,
    pub release_date: Option<String>,
    pub release_note: Bilingual<Option<ReleaseNote>>,
    pub datasets: Vec<DatasetRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNote {
    pub lines: Vec<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub dataset_id: String,
    pub version: String,
}

/// Whether registry metadata has been attached. Moves one way only, from
/// `Unenriched` to `Enriched`; `metadata` is `None` when the registry has no
/// record or the dataset id routes to no registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum OriginalMetadata {
    #[default]
    Unenriched,
    Enriched { metadata: Option<Value> },
}

impl OriginalMetadata {
    pub fn is_enriched(&self) -> bool {
        matches!(self, OriginalMetadata::Enriched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub dataset_id: String,
    pub version: String,
    pub hum_id: HumId,
    /// Every hum version that lists this dataset version, in order.
    pub hum_version_ids: Vec<HumVersionId>,
    pub type_of_data: Bilingual<Option<String>>,
    pub criteria: Bilingual<Option<String>>,
    pub release_date: Option<String>,
    pub experiments: Vec<Experiment>,
    pub original_metadata: OriginalMetadata,
}

impl Dataset {
    /// Store and index key. Owners get their own directory because dataset
    /// versions are numbered per project.
    pub fn record_id(&self) -> String {
        format!("{}/{}-{}", self.hum_id, self.dataset_id, self.version)
    }

    pub fn reference(&self) -> DatasetRef {
        DatasetRef {
            dataset_id: self.dataset_id.clone(),
            version: self.version.clone(),
        }
    }
}

/// One molecular-data table, keyed by canonical English header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub header: Bilingual<Option<TextValue>>,
    pub data: BTreeMap<String, Bilingual<Option<TextValue>>>,
}
