use std::time::Duration;

use assert_matches::assert_matches;

use humandbs_crawler::config::{Config, ConfigLoader};
use humandbs_crawler::domain::Lang;
use humandbs_crawler::error::CrawlError;
use humandbs_crawler::walker::MAX_CONCURRENCY;

#[test]
fn parse_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("humandbs.json");
    std::fs::write(
        &path,
        r#"{
            "schemaVersion": 1,
            "cacheDir": "/var/cache/humandbs",
            "langs": ["en"],
            "concurrency": 4,
            "maxVersion": 20,
            "requestDelayMs": 250,
            "crossrefMailto": "curator@example.org"
        }"#,
    )
    .unwrap();

    let settings = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(settings.cache_dir.as_deref().map(|dir| dir.as_str()), Some("/var/cache/humandbs"));
    assert_eq!(settings.langs, vec![Lang::En]);
    assert_eq!(settings.concurrency, 4);
    assert_eq!(settings.max_version, 20);
    assert_eq!(settings.request_delay, Duration::from_millis(250));
    assert_eq!(settings.crossref_mailto.as_deref(), Some("curator@example.org"));
}

#[test]
fn explicit_config_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("missing.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CrawlError::ConfigRead(_))
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("humandbs.json");
    std::fs::write(&path, r#"{"concurency": 4}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CrawlError::ConfigParse(_))
    );
}

#[test]
fn limits_are_enforced() {
    let config = Config {
        concurrency: Some(500),
        ..Config::default()
    };
    let settings = ConfigLoader::resolve_config(config, None).unwrap();
    assert_eq!(settings.concurrency, MAX_CONCURRENCY);

    let config = Config {
        langs: Some(vec![]),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config, None),
        Err(CrawlError::ConfigParse(_))
    );

    let config = Config {
        schema_version: Some(2),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config, None),
        Err(CrawlError::ConfigParse(_))
    );
}
