mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;

use humandbs_crawler::error::CrawlError;
use humandbs_crawler::providers::{
    ArchiveClient, ArchiveKind, Archives, CrossrefClient, DatasetLookup, DoiQuery, DoiSearch,
    Source, Throttle,
};

use common::{MockHttp, temp_store};

const REGISTRY: &str = "https://registry.test/search";
const CROSSREF: &str = "https://crossref.test";

fn no_delay() -> Throttle {
    Throttle::new(Duration::ZERO)
}

#[test]
fn second_lookup_is_served_from_cache() {
    let (_temp, store) = temp_store();
    let url = format!("{REGISTRY}/entry/jga-dataset/JGAD000001.json");
    let http = MockHttp::default().with(
        &url,
        200,
        r#"{"properties": {"title": "Japanese T2D GWAS"}, "type": "jga-dataset"}"#,
    );
    let client = ArchiveClient::new(ArchiveKind::Jga, &http, &store, REGISTRY);

    let first = client.get("JGAD000001", true).unwrap();
    assert_eq!(first.source, Source::Network);
    assert_eq!(first.metadata, Some(json!({"title": "Japanese T2D GWAS"})));

    let second = client.get("JGAD000001", true).unwrap();
    assert_eq!(second.source, Source::Cache);
    assert_eq!(second.metadata, first.metadata);
    assert_eq!(http.calls().len(), 1);
}

#[test]
fn absence_is_cached_too() {
    let (_temp, store) = temp_store();
    let http = MockHttp::default();
    let client = ArchiveClient::new(ArchiveKind::Sra, &http, &store, REGISTRY);

    let first = client.get("DRA000908", true).unwrap();
    assert_eq!(first.metadata, None);
    let second = client.get("DRA000908", true).unwrap();
    assert_eq!(second.metadata, None);
    assert_eq!(second.source, Source::Cache);
    assert_eq!(http.calls(), vec![format!("{REGISTRY}/entry/sra-submission/DRA000908.json")]);

    client.get("DRA000908", false).unwrap();
    assert_eq!(http.calls().len(), 2);
}

#[test]
fn server_errors_are_not_cached() {
    let (_temp, store) = temp_store();
    let url = format!("{REGISTRY}/entry/jga-study/JGAS000001.json");
    let http = MockHttp::default().with(&url, 502, "Bad Gateway");
    let client = ArchiveClient::new(ArchiveKind::Jga, &http, &store, REGISTRY);

    assert_matches!(
        client.get("JGAS000001", true),
        Err(CrawlError::RegistryStatus { status: 502, .. })
    );
    assert_matches!(
        client.get("JGAS000001", true),
        Err(CrawlError::RegistryStatus { status: 502, .. })
    );
    assert_eq!(http.calls().len(), 2);
}

#[test]
fn archives_route_by_dataset_id() {
    let (_temp, store) = temp_store();
    let http = MockHttp::default()
        .with(
            &format!("{REGISTRY}/entry/sra-study/DRP000001.json"),
            200,
            r#"{"_source": {"title": "RNA-seq"}}"#,
        )
        .with(
            &format!("{REGISTRY}/entry/jga-dataset/JGAD000002.json"),
            200,
            r#"{"properties": {"title": "WGS"}}"#,
        );
    let archives = Archives::new(
        ArchiveClient::new(ArchiveKind::Sra, &http, &store, REGISTRY),
        ArchiveClient::new(ArchiveKind::Jga, &http, &store, REGISTRY),
        no_delay(),
    );

    let ids = vec![
        "DRP000001".to_string(),
        "JGAD000002".to_string(),
        "hum0001.v1.freq.v1".to_string(),
    ];
    let results = archives.lookup_batch(&ids, true);

    assert_eq!(results[0].as_ref().unwrap().metadata, Some(json!({"title": "RNA-seq"})));
    assert_eq!(results[1].as_ref().unwrap().metadata, Some(json!({"title": "WGS"})));
    assert_eq!(results[2].as_ref().unwrap().source, Source::Unroutable);
    assert_eq!(http.calls().len(), 2);
}

#[test]
fn crossref_match_is_cached_by_title_and_hint() {
    let (_temp, store) = temp_store();
    let search_url = CrossrefClient::new(&MockHttp::default(), &store, CROSSREF)
        .search_url("Genome-wide association study of T2D", Some("2019-03-01"));
    let http = MockHttp::default().with(
        &search_url,
        200,
        r#"{"message": {"items": [
            {"DOI": "10.1000/unrelated", "title": ["Something else"]},
            {"DOI": "10.1038/ng.1234", "title": ["Genome-wide association study of T2D."]}
        ]}}"#,
    );
    let client = CrossrefClient::new(&http, &store, CROSSREF).with_throttle(no_delay());
    let queries = vec![
        DoiQuery {
            title: "Genome-wide association study of T2D".to_string(),
            existing: None,
        },
        DoiQuery {
            title: "Already known".to_string(),
            existing: Some("10.1000/known".to_string()),
        },
    ];

    let answers = client.search_batch(&queries, Some("2019-03-01"), true);
    let found = answers
        .iter()
        .find(|(title, _)| title.starts_with("Genome"))
        .unwrap();
    assert_eq!(found.1.as_ref().unwrap().as_deref(), Some("10.1038/ng.1234"));
    let known = answers
        .iter()
        .find(|(title, _)| title == "Already known")
        .unwrap();
    assert_eq!(known.1.as_ref().unwrap().as_deref(), Some("10.1000/known"));

    client.search_batch(&queries, Some("2019-03-01"), true);
    assert_eq!(http.calls().len(), 1);
}

#[test]
fn crossref_mailto_is_sent() {
    let (_temp, store) = temp_store();
    let http = MockHttp::default();
    let client = CrossrefClient::new(&http, &store, CROSSREF)
        .with_mailto(Some("curator@example.org".to_string()));
    let url = client.search_url("Title", None);
    assert!(url.starts_with(&format!("{CROSSREF}/works?")));
    assert!(url.contains("mailto=curator%40example.org"));

    let lookup = client.search("Title", None, true).unwrap();
    assert_eq!(lookup.metadata, None);
    assert_eq!(lookup.source, Source::Network);
}
