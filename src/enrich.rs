//! Attaches registry metadata to datasets and DOIs to publications.

use serde::Serialize;

use crate::model::{Dataset, OriginalMetadata, Research};
use crate::providers::{DatasetLookup, DoiQuery, DoiSearch, Source};

#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichOptions {
    /// Re-fetch datasets that are already enriched.
    pub force: bool,
    pub use_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetEnrichReport {
    pub enriched: usize,
    pub skipped: usize,
    pub unroutable: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoiEnrichReport {
    pub projects_searched: usize,
    pub dois_added: usize,
    pub failures: usize,
}

/// True when some publication of the project still lacks a DOI.
pub fn research_needs_doi(research: &Research) -> bool {
    research
        .publications
        .iter()
        .any(|publication| publication.doi.is_none())
}

/// Enriches datasets in place. Already-enriched datasets are left alone
/// unless `force` is set; a failed lookup leaves the dataset untouched.
pub fn enrich_datasets(
    datasets: &mut [Dataset],
    lookup: &dyn DatasetLookup,
    options: EnrichOptions,
) -> DatasetEnrichReport {
    let mut report = DatasetEnrichReport::default();
    let mut pending = Vec::new();
    for (idx, dataset) in datasets.iter().enumerate() {
        if dataset.original_metadata.is_enriched() && !options.force {
            report.skipped += 1;
        } else {
            pending.push(idx);
        }
    }

    let ids = pending
        .iter()
        .map(|&idx| datasets[idx].dataset_id.clone())
        .collect::<Vec<_>>();
    let results = lookup.lookup_batch(&ids, options.use_cache);

    for (idx, result) in pending.into_iter().zip(results) {
        let dataset = &mut datasets[idx];
        match result {
            Ok(found) => {
                if found.source == Source::Unroutable {
                    report.unroutable += 1;
                }
                dataset.original_metadata = OriginalMetadata::Enriched {
                    metadata: found.metadata,
                };
                report.enriched += 1;
            }
            Err(err) => {
                tracing::warn!(
                    dataset = %dataset.record_id(),
                    error = %err,
                    "metadata lookup failed"
                );
                report.failures += 1;
            }
        }
    }
    report
}

/// Searches DOIs for publications that lack one. Known DOIs are never
/// replaced by an empty answer.
pub fn enrich_research(
    research: &mut Research,
    search: &dyn DoiSearch,
    use_cache: bool,
    report: &mut DoiEnrichReport,
) {
    if !research_needs_doi(research) {
        return;
    }
    report.projects_searched += 1;

    let queries = research
        .publications
        .iter()
        .filter_map(|publication| {
            let title = publication.title.preferred()?.trim();
            (!title.is_empty()).then(|| DoiQuery {
                title: title.to_string(),
                existing: publication.doi.clone(),
            })
        })
        .collect::<Vec<_>>();
    if queries.is_empty() {
        return;
    }
    let hint = research
        .latest_version()
        .and_then(|version| version.release_date.clone());

    for (title, answer) in search.search_batch(&queries, hint.as_deref(), use_cache) {
        let doi = match answer {
            Ok(Some(doi)) => doi,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(hum_id = %research.hum_id, title, error = %err, "DOI search failed");
                report.failures += 1;
                continue;
            }
        };
        for publication in &mut research.publications {
            let same_title = publication
                .title
                .preferred()
                .is_some_and(|known| known.trim() == title);
            if same_title && publication.doi.is_none() {
                publication.doi = Some(doi.clone());
                report.dois_added += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::domain::HumId;
    use crate::error::CrawlError;
    use crate::model::{Bilingual, Publication};
    use crate::providers::Lookup;

    struct MockLookup {
        answers: BTreeMap<String, Option<serde_json::Value>>,
        calls: Mutex<Vec<String>>,
    }

    impl DatasetLookup for MockLookup {
        fn lookup_batch(&self, ids: &[String], _use_cache: bool) -> Vec<Result<Lookup, CrawlError>> {
            self.calls.lock().unwrap().extend(ids.iter().cloned());
            ids.iter()
                .map(|id| match self.answers.get(id) {
                    Some(metadata) => Ok(Lookup {
                        metadata: metadata.clone(),
                        source: Source::Network,
                    }),
                    None => Err(CrawlError::RegistryStatus {
                        registry: "jga".to_string(),
                        status: 503,
                        message: "unavailable".to_string(),
                    }),
                })
                .collect()
        }
    }

    struct MockSearch {
        answers: BTreeMap<String, Option<String>>,
    }

    impl DoiSearch for MockSearch {
        fn search_batch(
            &self,
            queries: &[DoiQuery],
            _date_hint: Option<&str>,
            _use_cache: bool,
        ) -> Vec<(String, Result<Option<String>, CrawlError>)> {
            queries
                .iter()
                .map(|query| {
                    let answer = self.answers.get(&query.title).cloned().flatten();
                    (query.title.clone(), Ok(answer))
                })
                .collect()
        }
    }

    fn dataset(id: &str) -> Dataset {
        Dataset {
            dataset_id: id.to_string(),
            version: "v1".to_string(),
            hum_id: "hum0001".parse().unwrap(),
            hum_version_ids: vec![],
            type_of_data: Bilingual::default(),
            criteria: Bilingual::default(),
            release_date: None,
            experiments: vec![],
            original_metadata: OriginalMetadata::Unenriched,
        }
    }

    fn publication(en: Option<&str>, ja: Option<&str>, doi: Option<&str>) -> Publication {
        Publication {
            title: Bilingual::new(ja.map(str::to_string), en.map(str::to_string)),
            doi: doi.map(str::to_string),
            dataset_ids: vec![],
        }
    }

    fn research(publications: Vec<Publication>) -> Research {
        let hum_id: HumId = "hum0001".parse().unwrap();
        Research {
            hum_id,
            title: Bilingual::default(),
            summary: Bilingual::default(),
            data_provider: Bilingual::default(),
            publications,
            controlled_access_users: Bilingual::default(),
            versions: vec![],
        }
    }

    #[test]
    fn failures_leave_datasets_unenriched() {
        let lookup = MockLookup {
            answers: BTreeMap::from([("JGAD000001".to_string(), Some(json!({"title": "WGS"})))]),
            calls: Mutex::new(Vec::new()),
        };
        let mut datasets = vec![dataset("JGAD000001"), dataset("JGAD000002")];
        let report = enrich_datasets(
            &mut datasets,
            &lookup,
            EnrichOptions {
                force: false,
                use_cache: true,
            },
        );
        assert_eq!(report.enriched, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(
            datasets[0].original_metadata,
            OriginalMetadata::Enriched {
                metadata: Some(json!({"title": "WGS"}))
            }
        );
        assert_eq!(datasets[1].original_metadata, OriginalMetadata::Unenriched);
    }

    #[test]
    fn enriched_datasets_are_skipped_without_force() {
        let lookup = MockLookup {
            answers: BTreeMap::from([("JGAD000001".to_string(), None)]),
            calls: Mutex::new(Vec::new()),
        };
        let mut datasets = vec![dataset("JGAD000001")];
        datasets[0].original_metadata = OriginalMetadata::Enriched { metadata: None };

        let report = enrich_datasets(&mut datasets, &lookup, EnrichOptions::default());
        assert_eq!(report.skipped, 1);
        assert!(lookup.calls.lock().unwrap().is_empty());

        let forced = EnrichOptions {
            force: true,
            use_cache: true,
        };
        let report = enrich_datasets(&mut datasets, &lookup, forced);
        assert_eq!(report.enriched, 1);
        assert_eq!(lookup.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn doi_merge_never_erases_known_values() {
        let search = MockSearch {
            answers: BTreeMap::from([
                ("Known paper".to_string(), None),
                ("Known elsewhere".to_string(), Some("10.1000/other".to_string())),
                ("Found paper".to_string(), Some("10.1000/found".to_string())),
                ("Missing paper".to_string(), None),
            ]),
        };
        let mut research = research(vec![
            publication(Some("Known paper"), None, Some("10.1000/known")),
            publication(Some("Known elsewhere"), None, Some("10.1000/known")),
            publication(Some("Found paper"), Some("見つかる論文"), None),
            publication(None, Some("Missing paper"), None),
        ]);
        assert!(research_needs_doi(&research));

        let mut report = DoiEnrichReport::default();
        enrich_research(&mut research, &search, true, &mut report);

        assert_eq!(research.publications[0].doi.as_deref(), Some("10.1000/known"));
        assert_eq!(research.publications[1].doi.as_deref(), Some("10.1000/known"));
        assert_eq!(research.publications[2].doi.as_deref(), Some("10.1000/found"));
        assert_eq!(research.publications[3].doi, None);
        assert_eq!(report.dois_added, 1);
    }

    #[test]
    fn complete_projects_are_not_searched() {
        let search = MockSearch {
            answers: BTreeMap::new(),
        };
        let mut research = research(vec![publication(Some("Known"), None, Some("10.1000/x"))]);
        let mut report = DoiEnrichReport::default();
        enrich_research(&mut research, &search, true, &mut report);
        assert_eq!(report.projects_searched, 0);
    }
}
