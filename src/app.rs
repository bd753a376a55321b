use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::build::{ProjectRecords, VersionPages, build_project};
use crate::config::Settings;
use crate::domain::{HumId, HumVersionId, Lang};
use crate::enrich::{
    DatasetEnrichReport, DoiEnrichReport, EnrichOptions, enrich_datasets, enrich_research,
};
use crate::error::CrawlError;
use crate::fetcher::CachedFetcher;
use crate::http::HttpGet;
use crate::mapping::MappingTable;
use crate::model::{Bilingual, Dataset, HumVersion, Research};
use crate::ownership::{OwnershipReport, reconcile};
use crate::parse::{parse_detail, parse_home, parse_release};
use crate::portal::Portal;
use crate::providers::{ArchiveClient, ArchiveKind, Archives, CrossrefClient, Throttle};
use crate::store::{PageKind, RecordKind, Store};
use crate::validate::{JsonDirSink, Validate, handoff};
use crate::walker::{DownloadOptions, DownloadReport, ProjectReport, Walker};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub summary: DownloadReport,
    pub projects: Vec<ProjectReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFailure {
    pub hum_id: HumId,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub projects: usize,
    pub research: usize,
    pub versions: usize,
    pub datasets: usize,
    pub failed: Vec<ProjectFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichResult {
    pub datasets: DatasetEnrichReport,
    pub dois: DoiEnrichReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub kind: String,
    pub id: String,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub out_dir: String,
    pub written: usize,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn phase(message: String) -> Self {
        Self {
            message,
            elapsed: None,
        }
    }

    fn done(message: String, started: Instant) -> Self {
        Self {
            message,
            elapsed: Some(started.elapsed()),
        }
    }
}

/// Receives progress events. Download reports from worker threads, hence
/// `Sync`.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

/// The pipeline commands over one store. Portal pages go through `P`;
/// registries and Crossref go through `R`.
pub struct App<P: HttpGet, R: HttpGet> {
    store: Store,
    portal: Portal,
    mapping: MappingTable,
    settings: Settings,
    portal_http: P,
    registry_http: R,
}

impl<P: HttpGet, R: HttpGet> App<P, R> {
    pub fn new(
        store: Store,
        settings: Settings,
        mapping: MappingTable,
        portal_http: P,
        registry_http: R,
    ) -> Self {
        Self {
            store,
            portal: Portal::new(&settings.portal_base),
            mapping,
            settings,
            portal_http,
            registry_http,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Downloads one project, or every project the home pages list.
    pub fn download(
        &self,
        hum_id: Option<HumId>,
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, CrawlError> {
        let started = Instant::now();
        let fetcher = CachedFetcher::new(&self.portal_http);
        let walker = Walker::new(&fetcher, &self.store, &self.portal);

        let hum_ids = match hum_id {
            Some(hum_id) => vec![hum_id],
            None => {
                sink.event(ProgressEvent::phase(
                    "phase=Resolve; reading home pages".to_string(),
                ));
                walker.work_list(&options.langs, options.use_cache)?
            }
        };
        sink.event(ProgressEvent::phase(format!(
            "phase=Download; projects={} workers={}",
            hum_ids.len(),
            options.effective_concurrency()
        )));

        let on_project = |report: &ProjectReport| {
            sink.event(ProgressEvent::phase(format!(
                "phase=Download; {} versions={} fetched={} cached={} failures={}",
                report.hum_id,
                report.versions,
                report.pages.fetched,
                report.pages.cached,
                report.failures
            )));
        };
        let (summary, projects) = walker.download(&hum_ids, &options, &on_project);

        sink.event(ProgressEvent::done(
            format!(
                "phase=Done; projects={} pages_fetched={} pages_cached={}",
                summary.projects, summary.pages_fetched, summary.pages_cached
            ),
            started,
        ));
        Ok(DownloadResult { summary, projects })
    }

    /// Parses every cached project and writes its records. A project whose
    /// pages fail to parse is skipped and reported.
    pub fn build(&self, sink: &dyn ProgressSink) -> Result<BuildResult, CrawlError> {
        let started = Instant::now();
        sink.event(ProgressEvent::phase(
            "phase=Resolve; scanning page cache".to_string(),
        ));

        let mut grouped: BTreeMap<HumId, BTreeMap<u32, Vec<Lang>>> = BTreeMap::new();
        for (id, lang) in self.store.cached_detail_pages()? {
            grouped
                .entry(id.hum_id().clone())
                .or_default()
                .entry(id.version())
                .or_default()
                .push(lang);
        }
        if grouped.is_empty() {
            return Err(CrawlError::RecordNotFound(
                "no cached detail pages; run download first".to_string(),
            ));
        }

        let home_titles = self.home_titles();
        let mut result = BuildResult::default();
        for (hum_id, versions) in &grouped {
            sink.event(ProgressEvent::phase(format!("phase=Build; {hum_id}")));
            let records = self
                .load_project_pages(hum_id, versions)
                .and_then(|pages| {
                    let title = Bilingual::new(
                        home_titles.get(Lang::Ja).get(hum_id).cloned(),
                        home_titles.get(Lang::En).get(hum_id).cloned(),
                    );
                    build_project(hum_id, &pages, &title, &self.mapping)
                })
                .and_then(|records| self.write_project(records));
            match records {
                Ok(written) => {
                    result.projects += 1;
                    result.research += 1;
                    result.versions += written.versions.len();
                    result.datasets += written.datasets.len();
                }
                Err(err) => {
                    tracing::warn!(hum_id = %hum_id, error = %err, "project skipped");
                    result.failed.push(ProjectFailure {
                        hum_id: hum_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        sink.event(ProgressEvent::done(
            format!(
                "phase=Done; projects={} failed={}",
                result.projects,
                result.failed.len()
            ),
            started,
        ));
        Ok(result)
    }

    /// Runs the ownership check over every stored hum version.
    pub fn check_ownership(&self, sink: &dyn ProgressSink) -> Result<OwnershipReport, CrawlError> {
        let versions = self.store.list_records::<HumVersion>(RecordKind::Version)?;
        if versions.is_empty() {
            return Err(CrawlError::RecordNotFound(
                "no version records; run build first".to_string(),
            ));
        }
        sink.event(ProgressEvent::phase(format!(
            "phase=Check; versions={}",
            versions.len()
        )));
        let report = reconcile(&versions);
        for conflict in &report.conflicts {
            tracing::warn!(
                dataset = %conflict.dataset_id,
                version = %conflict.version,
                owners = conflict.claims.len(),
                "dataset claimed by several projects"
            );
        }
        Ok(report)
    }

    /// Attaches registry metadata to datasets and DOIs to publications, then
    /// writes the records back.
    pub fn enrich(&self, options: EnrichOptions, sink: &dyn ProgressSink) -> Result<EnrichResult, CrawlError> {
        let started = Instant::now();
        let throttle = Throttle::new(self.settings.request_delay);
        let base = &self.settings.registry_base;
        let archives = Archives::new(
            ArchiveClient::new(ArchiveKind::Sra, &self.registry_http, &self.store, base),
            ArchiveClient::new(ArchiveKind::Jga, &self.registry_http, &self.store, base),
            throttle,
        );
        let crossref = CrossrefClient::new(&self.registry_http, &self.store, &self.settings.crossref_base)
            .with_mailto(self.settings.crossref_mailto.clone())
            .with_throttle(throttle);

        let mut datasets = self.store.list_records::<Dataset>(RecordKind::Dataset)?;
        sink.event(ProgressEvent::phase(format!(
            "phase=Enrich; datasets={}",
            datasets.len()
        )));
        let dataset_report = enrich_datasets(&mut datasets, &archives, options);
        for dataset in &datasets {
            Store::write_json(
                &self.store.record_path(RecordKind::Dataset, &dataset.record_id()),
                dataset,
            )?;
        }

        let mut research = self.store.list_records::<Research>(RecordKind::Research)?;
        sink.event(ProgressEvent::phase(format!(
            "phase=Enrich; research={}",
            research.len()
        )));
        let mut doi_report = DoiEnrichReport::default();
        for project in &mut research {
            let before = doi_report.dois_added;
            enrich_research(project, &crossref, options.use_cache, &mut doi_report);
            if doi_report.dois_added > before {
                Store::write_json(
                    &self.store.record_path(RecordKind::Research, project.hum_id.as_str()),
                    project,
                )?;
            }
        }

        sink.event(ProgressEvent::done(
            format!(
                "phase=Done; enriched={} dois_added={}",
                dataset_report.enriched, doi_report.dois_added
            ),
            started,
        ));
        Ok(EnrichResult {
            datasets: dataset_report,
            dois: doi_report,
        })
    }

    /// Hands every stored record to a JSON-directory index. Records failing
    /// validation are reported, not written.
    pub fn export(&self, out_dir: &Utf8Path, sink: &dyn ProgressSink) -> Result<ExportResult, CrawlError> {
        let started = Instant::now();
        let index = JsonDirSink::new(out_dir);
        let mut result = ExportResult {
            out_dir: out_dir.to_string(),
            ..ExportResult::default()
        };

        let research = self.store.list_records::<Research>(RecordKind::Research)?;
        let versions = self.store.list_records::<HumVersion>(RecordKind::Version)?;
        let datasets = self.store.list_records::<Dataset>(RecordKind::Dataset)?;
        if research.is_empty() && versions.is_empty() && datasets.is_empty() {
            return Err(CrawlError::RecordNotFound(
                "no records to export; run build first".to_string(),
            ));
        }
        sink.event(ProgressEvent::phase(format!(
            "phase=Export; research={} versions={} datasets={}",
            research.len(),
            versions.len(),
            datasets.len()
        )));

        export_all(&index, &research, &mut result)?;
        export_all(&index, &versions, &mut result)?;
        export_all(&index, &datasets, &mut result)?;

        sink.event(ProgressEvent::done(
            format!(
                "phase=Done; written={} rejected={}",
                result.written,
                result.rejected.len()
            ),
            started,
        ));
        Ok(result)
    }

    fn home_titles(&self) -> Bilingual<BTreeMap<HumId, String>> {
        let mut titles = Bilingual::<BTreeMap<HumId, String>>::default();
        for lang in Lang::ALL {
            let parsed = Store::read_cached(&self.store.home_page_path(lang))
                .and_then(|cached| cached.map(|html| parse_home(&html, &self.portal)).transpose());
            match parsed {
                Ok(Some(index)) => *titles.get_mut(lang) = index.titles,
                Ok(None) => {}
                Err(err) => tracing::warn!(lang = %lang, error = %err, "home page unusable"),
            }
        }
        titles
    }

    fn load_project_pages(
        &self,
        hum_id: &HumId,
        versions: &BTreeMap<u32, Vec<Lang>>,
    ) -> Result<Vec<VersionPages>, CrawlError> {
        let mut out = Vec::with_capacity(versions.len());
        for (&version, langs) in versions {
            let id = hum_id.version(version);
            let mut pages = VersionPages::new(id.clone());
            for &lang in langs {
                if let Some(html) = self.read_page(PageKind::Detail, &id, lang)? {
                    let detail = parse_detail(&html, &page_label(&id, lang, "detail"))?;
                    pages.detail.insert(lang, detail);
                }
                if let Some(html) = self.read_page(PageKind::Release, &id, lang)? {
                    let release = parse_release(&html, &page_label(&id, lang, "release"))?;
                    pages.release.insert(lang, release);
                }
            }
            out.push(pages);
        }
        Ok(out)
    }

    fn read_page(&self, kind: PageKind, id: &HumVersionId, lang: Lang) -> Result<Option<String>, CrawlError> {
        Store::read_cached(&self.store.page_path(kind, id, lang))
    }

    /// Writes freshly built records. Enrichment already stored for the same
    /// dataset version or publication is kept.
    fn write_project(&self, mut records: ProjectRecords) -> Result<ProjectRecords, CrawlError> {
        for dataset in &mut records.datasets {
            let path = self.store.record_path(RecordKind::Dataset, &dataset.record_id());
            if path.as_std_path().exists() {
                let previous: Dataset = Store::read_json(&path)?;
                if previous.original_metadata.is_enriched() {
                    dataset.original_metadata = previous.original_metadata;
                }
            }
        }

        let research_path = self
            .store
            .record_path(RecordKind::Research, records.research.hum_id.as_str());
        if research_path.as_std_path().exists() {
            let previous: Research = Store::read_json(&research_path)?;
            for publication in &mut records.research.publications {
                if publication.doi.is_some() {
                    continue;
                }
                publication.doi = previous
                    .publications
                    .iter()
                    .find(|known| known.title == publication.title)
                    .and_then(|known| known.doi.clone());
            }
        }

        Store::write_json(&research_path, &records.research)?;
        for version in &records.versions {
            Store::write_json(
                &self
                    .store
                    .record_path(RecordKind::Version, &version.hum_version_id.to_string()),
                version,
            )?;
        }
        for dataset in &records.datasets {
            Store::write_json(
                &self.store.record_path(RecordKind::Dataset, &dataset.record_id()),
                dataset,
            )?;
        }
        Ok(records)
    }
}

fn page_label(id: &HumVersionId, lang: Lang, kind: &str) -> String {
    format!("{id} {kind} ({lang})")
}

fn export_all<T: Validate>(
    index: &JsonDirSink,
    records: &[T],
    result: &mut ExportResult,
) -> Result<(), CrawlError> {
    for record in records {
        match handoff(index, record) {
            Ok(()) => result.written += 1,
            Err(CrawlError::SchemaValidation {
                kind,
                id,
                violations,
            }) => {
                tracing::warn!(kind, id, "record rejected");
                result.rejected.push(Rejection {
                    kind,
                    id,
                    violations,
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
