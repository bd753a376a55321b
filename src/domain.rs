use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

static HUM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^hum\d{4}$").expect("valid humId pattern"));
static HUM_VERSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(hum\d{4})[-.]v(\d+)$").expect("valid humVersionId pattern"));
static SEQUENCE_ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[DES]R[APXRSZ]\d+$").expect("valid accession pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ja,
    En,
}

impl Lang {
    pub const ALL: [Lang; 2] = [Lang::Ja, Lang::En];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Ja => "ja",
            Lang::En => "en",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = CrawlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ja" => Ok(Lang::Ja),
            "en" => Ok(Lang::En),
            _ => Err(CrawlError::InvalidLang(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumId(String);

impl HumId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn version(&self, version: u32) -> HumVersionId {
        HumVersionId {
            hum_id: self.clone(),
            version,
        }
    }
}

impl fmt::Display for HumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HumId {
    type Err = CrawlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if !HUM_ID_RE.is_match(&normalized) {
            return Err(CrawlError::InvalidHumId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for HumId {
    type Error = CrawlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HumId> for String {
    fn from(value: HumId) -> Self {
        value.0
    }
}

/// `{humId}-v{n}`. The portal sometimes writes `hum0001.v1`; both parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumVersionId {
    hum_id: HumId,
    version: u32,
}

impl HumVersionId {
    pub fn hum_id(&self) -> &HumId {
        &self.hum_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Finds the first humVersionId inside free text such as a heading.
    pub fn find_in(text: &str) -> Option<Self> {
        static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(hum\d{4})[-.]v(\d+)").expect("valid inline humVersionId pattern")
        });
        let lowered = text.to_ascii_lowercase();
        let caps = INLINE_RE.captures(&lowered)?;
        let hum_id = HumId(caps.get(1)?.as_str().to_string());
        let version = caps.get(2)?.as_str().parse().ok()?;
        Some(Self { hum_id, version })
    }
}

impl fmt::Display for HumVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}", self.hum_id, self.version)
    }
}

impl FromStr for HumVersionId {
    type Err = CrawlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let caps = HUM_VERSION_ID_RE
            .captures(&normalized)
            .ok_or_else(|| CrawlError::InvalidHumVersionId(value.to_string()))?;
        let version = caps[2]
            .parse::<u32>()
            .map_err(|_| CrawlError::InvalidHumVersionId(value.to_string()))?;
        if version == 0 {
            return Err(CrawlError::InvalidHumVersionId(value.to_string()));
        }
        Ok(Self {
            hum_id: HumId(caps[1].to_string()),
            version,
        })
    }
}

impl TryFrom<String> for HumVersionId {
    type Error = CrawlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HumVersionId> for String {
    fn from(value: HumVersionId) -> Self {
        value.to_string()
    }
}

/// Which external registry holds metadata for a dataset id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Archive {
    Sequence,
    Genotype,
}

/// Routes a dataset id by naming convention: `JGA*` ids live in the genotype
/// archive, INSDC read-archive accessions in the sequence archive.
pub fn archive_for(dataset_id: &str) -> Option<Archive> {
    let id = dataset_id.trim();
    if id.starts_with("JGA") {
        return Some(Archive::Genotype);
    }
    if SEQUENCE_ACCESSION_RE.is_match(id) {
        return Some(Archive::Sequence);
    }
    None
}

/// Numeric part of a `v{n}` version label.
pub fn version_number(label: &str) -> Option<u32> {
    label
        .trim()
        .trim_start_matches(['v', 'V'])
        .parse()
        .ok()
}
