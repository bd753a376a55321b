use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use serde::Serialize;

use crate::domain::{HumId, Lang};
use crate::error::CrawlError;
use crate::fetcher::{CachedFetcher, Origin};
use crate::http::HttpGet;
use crate::parse::parse_home;
use crate::portal::Portal;
use crate::store::{PageKind, Store};

pub const MAX_CONCURRENCY: usize = 32;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_VERSION: u32 = 50;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub langs: Vec<Lang>,
    pub use_cache: bool,
    pub concurrency: usize,
    pub max_version: u32,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            langs: Lang::ALL.to_vec(),
            use_cache: true,
            concurrency: DEFAULT_CONCURRENCY,
            max_version: DEFAULT_MAX_VERSION,
        }
    }
}

impl DownloadOptions {
    /// Worker count actually used, whatever was configured.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCounts {
    pub fetched: usize,
    pub cached: usize,
}

impl PageCounts {
    fn record(&mut self, origin: Origin) {
        match origin {
            Origin::Cache => self.cached += 1,
            Origin::Network => self.fetched += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReport {
    pub hum_id: HumId,
    pub versions: u32,
    pub pages: PageCounts,
    pub failures: usize,
    /// Version at which probing stopped on a transient failure; later
    /// versions may exist but were not discovered in this run.
    pub truncated_at: Option<u32>,
}

impl ProjectReport {
    fn new(hum_id: HumId) -> Self {
        Self {
            hum_id,
            versions: 0,
            pages: PageCounts::default(),
            failures: 0,
            truncated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    pub projects: usize,
    pub versions: u32,
    pub pages_fetched: usize,
    pub pages_cached: usize,
    pub failures: usize,
    pub truncated: Vec<ProjectReport>,
}

impl DownloadReport {
    fn from_projects(reports: &[ProjectReport]) -> Self {
        let mut summary = Self {
            projects: reports.len(),
            ..Self::default()
        };
        for report in reports {
            summary.versions += report.versions;
            summary.pages_fetched += report.pages.fetched;
            summary.pages_cached += report.pages.cached;
            summary.failures += report.failures;
            if report.truncated_at.is_some() {
                summary.truncated.push(report.clone());
            }
        }
        summary
    }
}

/// Drives the fetcher over humId × version × language.
pub struct Walker<'a, H: HttpGet> {
    fetcher: &'a CachedFetcher<H>,
    store: &'a Store,
    portal: &'a Portal,
}

impl<'a, H: HttpGet> Walker<'a, H> {
    pub fn new(fetcher: &'a CachedFetcher<H>, store: &'a Store, portal: &'a Portal) -> Self {
        Self {
            fetcher,
            store,
            portal,
        }
    }

    /// Union of the projects listed on the home page of every language, in
    /// first-seen order. Any failure here is fatal to the run.
    pub fn work_list(&self, langs: &[Lang], use_cache: bool) -> Result<Vec<HumId>, CrawlError> {
        let mut hum_ids: Vec<HumId> = Vec::new();
        for &lang in langs {
            let body = self.fetcher.fetch(
                &self.portal.home_url(lang),
                &self.store.home_page_path(lang),
                use_cache,
            )?;
            let index = parse_home(&body, self.portal)?;
            for hum_id in index.hum_ids {
                if !hum_ids.contains(&hum_id) {
                    hum_ids.push(hum_id);
                }
            }
        }
        if hum_ids.is_empty() {
            return Err(CrawlError::EmptyWorkList(
                "the home page lists no research projects".to_string(),
            ));
        }
        Ok(hum_ids)
    }

    /// Probes versions of one project in order until a version has no page
    /// in any requested language.
    pub fn probe_project(&self, hum_id: &HumId, options: &DownloadOptions) -> ProjectReport {
        let mut report = ProjectReport::new(hum_id.clone());
        for version in 1..=options.max_version {
            let id = hum_id.version(version);
            let mut found = false;
            let mut transient = false;

            for &lang in &options.langs {
                let detail = self.fetcher.fetch_traced(
                    &self.portal.detail_url(&id, lang),
                    &self.store.page_path(PageKind::Detail, &id, lang),
                    options.use_cache,
                );
                match detail {
                    Ok(fetched) => {
                        found = true;
                        report.pages.record(fetched.origin);
                    }
                    Err(err) if err.is_not_found() => {
                        tracing::debug!(id = %id, lang = %lang, "detail page absent");
                        continue;
                    }
                    Err(err) => {
                        tracing::warn!(id = %id, lang = %lang, error = %err, "detail page failed");
                        report.failures += 1;
                        transient = true;
                        continue;
                    }
                }

                let release = self.fetcher.fetch_traced(
                    &self.portal.release_url(&id, lang),
                    &self.store.page_path(PageKind::Release, &id, lang),
                    options.use_cache,
                );
                match release {
                    Ok(fetched) => report.pages.record(fetched.origin),
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        tracing::warn!(id = %id, lang = %lang, error = %err, "release page failed");
                        report.failures += 1;
                    }
                }
            }

            if found {
                report.versions += 1;
                continue;
            }
            if transient {
                tracing::warn!(id = %id, "probe stopped on a failure; later versions not checked");
                report.truncated_at = Some(version);
            }
            break;
        }
        report
    }

    /// Probes every project on a bounded pool of scoped threads. Reports come
    /// back in input order.
    pub fn download(
        &self,
        hum_ids: &[HumId],
        options: &DownloadOptions,
        on_project: &(dyn Fn(&ProjectReport) + Sync),
    ) -> (DownloadReport, Vec<ProjectReport>) {
        let reports = run_pool(hum_ids, options.effective_concurrency(), |hum_id| {
            let report = self.probe_project(hum_id, options);
            tracing::info!(
                hum_id = %report.hum_id,
                versions = report.versions,
                failures = report.failures,
                "project done"
            );
            on_project(&report);
            report
        });
        (DownloadReport::from_projects(&reports), reports)
    }
}

/// Runs `work` over `items` on at most `workers` threads pulling from a
/// shared cursor. Results keep the order of `items`.
fn run_pool<T, R, F>(items: &[T], workers: usize, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.clamp(1, MAX_CONCURRENCY).min(items.len().max(1));
    let cursor = AtomicUsize::new(0);
    let results = Mutex::new(Vec::with_capacity(items.len()));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let idx = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(item) = items.get(idx) else {
                        break;
                    };
                    let result = work(item);
                    if let Ok(mut results) = results.lock() {
                        results.push((idx, result));
                    }
                }
            });
        }
    });

    let mut results = results
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, result)| result).collect()
}
