use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Lang;
use crate::error::CrawlError;
use crate::portal::DEFAULT_PORTAL_BASE;
use crate::providers::{DEFAULT_BATCH_DELAY, DEFAULT_CROSSREF_BASE, DEFAULT_REGISTRY_BASE};
use crate::walker::{DEFAULT_CONCURRENCY, DEFAULT_MAX_VERSION, MAX_CONCURRENCY};

pub const DEFAULT_CONFIG_FILE: &str = "humandbs.json";
pub const MAILTO_ENV: &str = "CROSSREF_MAILTO";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `humandbs.json` as written by users. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub portal_base: Option<String>,
    #[serde(default)]
    pub registry_base: Option<String>,
    #[serde(default)]
    pub crossref_base: Option<String>,
    #[serde(default)]
    pub crossref_mailto: Option<String>,
    #[serde(default)]
    pub langs: Option<Vec<Lang>>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub max_version: Option<u32>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub mapping_table: Option<String>,
}

/// Configuration with every default filled in.
#[derive(Debug, Clone)]
pub struct Settings {
    pub schema_version: u32,
    pub cache_dir: Option<Utf8PathBuf>,
    pub portal_base: String,
    pub registry_base: String,
    pub crossref_base: String,
    pub crossref_mailto: Option<String>,
    pub langs: Vec<Lang>,
    pub concurrency: usize,
    pub max_version: u32,
    pub request_delay: Duration,
    pub timeout: Duration,
    pub mapping_table: Option<Utf8PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            cache_dir: None,
            portal_base: DEFAULT_PORTAL_BASE.to_string(),
            registry_base: DEFAULT_REGISTRY_BASE.to_string(),
            crossref_base: DEFAULT_CROSSREF_BASE.to_string(),
            crossref_mailto: None,
            langs: Lang::ALL.to_vec(),
            concurrency: DEFAULT_CONCURRENCY,
            max_version: DEFAULT_MAX_VERSION,
            request_delay: DEFAULT_BATCH_DELAY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            mapping_table: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `humandbs.json` when no path is given. Only the
    /// default file may be absent.
    pub fn resolve(path: Option<&str>) -> Result<Settings, CrawlError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        let env_mailto = std::env::var(MAILTO_ENV).ok();

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE}; using defaults");
            return Self::resolve_config(Config::default(), env_mailto);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CrawlError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CrawlError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, env_mailto)
    }

    pub fn resolve_config(config: Config, env_mailto: Option<String>) -> Result<Settings, CrawlError> {
        let defaults = Settings::default();
        let schema_version = config.schema_version.unwrap_or(defaults.schema_version);
        if schema_version != 1 {
            return Err(CrawlError::ConfigParse(format!(
                "unsupported schemaVersion {schema_version}"
            )));
        }

        let mut langs: Vec<Lang> = Vec::new();
        for lang in config.langs.unwrap_or(defaults.langs) {
            if !langs.contains(&lang) {
                langs.push(lang);
            }
        }
        if langs.is_empty() {
            return Err(CrawlError::ConfigParse("langs must not be empty".to_string()));
        }

        let concurrency = config.concurrency.unwrap_or(defaults.concurrency);
        if concurrency > MAX_CONCURRENCY {
            tracing::warn!(concurrency, max = MAX_CONCURRENCY, "concurrency capped");
        }

        let max_version = config.max_version.unwrap_or(defaults.max_version);
        if max_version == 0 {
            return Err(CrawlError::ConfigParse("maxVersion must be at least 1".to_string()));
        }

        Ok(Settings {
            schema_version,
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            portal_base: config.portal_base.unwrap_or(defaults.portal_base),
            registry_base: config.registry_base.unwrap_or(defaults.registry_base),
            crossref_base: config.crossref_base.unwrap_or(defaults.crossref_base),
            crossref_mailto: config
                .crossref_mailto
                .or(env_mailto)
                .filter(|value| !value.trim().is_empty()),
            langs,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            max_version,
            request_delay: config
                .request_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            mapping_table: config.mapping_table.map(Utf8PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config() {
        let settings = ConfigLoader::resolve_config(Config::default(), None).unwrap();
        assert_eq!(settings.langs, vec![Lang::Ja, Lang::En]);
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.request_delay, Duration::from_millis(1000));
        assert_eq!(settings.crossref_mailto, None);
    }

    #[test]
    fn config_mailto_beats_environment() {
        let config = Config {
            crossref_mailto: Some("curator@example.org".to_string()),
            ..Config::default()
        };
        let settings =
            ConfigLoader::resolve_config(config, Some("env@example.org".to_string())).unwrap();
        assert_eq!(settings.crossref_mailto.as_deref(), Some("curator@example.org"));

        let settings =
            ConfigLoader::resolve_config(Config::default(), Some("env@example.org".to_string()))
                .unwrap();
        assert_eq!(settings.crossref_mailto.as_deref(), Some("env@example.org"));
    }
}
