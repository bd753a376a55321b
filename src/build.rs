//! Turns the parsed pages of one project into records.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{HumId, HumVersionId, Lang};
use crate::error::CrawlError;
use crate::mapping::MappingTable;
use crate::model::{
    Bilingual, Dataset, DatasetRef, Experiment, HumVersion, OriginalMetadata, Publication,
    ReleaseNote, Research, VersionRef,
};
use crate::parse::detail::{ControlledAccessUser, MolecularTable, PublicationRow, SummaryDataset};
use crate::parse::{DetailPage, ReleasePage};

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%Y.%m.%d"];

/// Parsed pages of one hum version, per language. Either map may be missing
/// a language; a release page may be missing entirely.
#[derive(Debug, Clone)]
pub struct VersionPages {
    pub id: HumVersionId,
    pub detail: BTreeMap<Lang, DetailPage>,
    pub release: BTreeMap<Lang, ReleasePage>,
}

impl VersionPages {
    pub fn new(id: HumVersionId) -> Self {
        Self {
            id,
            detail: BTreeMap::new(),
            release: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRecords {
    pub research: Research,
    pub versions: Vec<HumVersion>,
    pub datasets: Vec<Dataset>,
}

/// Content a dataset version is defined by. A change bumps the version.
#[derive(Debug, Clone, PartialEq)]
struct DatasetContent {
    type_of_data: Bilingual<Option<String>>,
    criteria: Bilingual<Option<String>>,
    experiments: Vec<Experiment>,
}

struct DatasetState {
    version: u32,
    content: DatasetContent,
    record_index: usize,
}

/// Normalizes a portal date to `YYYY-MM-DD`; anything unparsable is
/// returned trimmed but otherwise untouched.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

pub fn build_project(
    hum_id: &HumId,
    pages: &[VersionPages],
    home_title: &Bilingual<Option<String>>,
    mapping: &MappingTable,
) -> Result<ProjectRecords, CrawlError> {
    let mut ordered = pages
        .iter()
        .filter(|version| !version.detail.is_empty())
        .collect::<Vec<_>>();
    ordered.sort_by_key(|version| version.id.version());
    if let Some(foreign) = ordered.iter().find(|version| version.id.hum_id() != hum_id) {
        return Err(CrawlError::parse(
            hum_id.as_str(),
            format!("{} does not belong to this project", foreign.id),
        ));
    }
    let Some(latest) = ordered.last() else {
        return Err(CrawlError::RecordNotFound(format!(
            "no detail pages for {hum_id}"
        )));
    };

    let mut datasets: Vec<Dataset> = Vec::new();
    let mut states: HashMap<String, DatasetState> = HashMap::new();
    let mut versions = Vec::with_capacity(ordered.len());

    for pages in &ordered {
        let mut refs: Vec<DatasetRef> = Vec::new();
        for (dataset_id, rows) in summary_datasets(pages) {
            let content = dataset_content(&dataset_id, &rows, pages, mapping);
            let record_index = match states.get_mut(&dataset_id) {
                Some(state) => {
                    if state.content != content {
                        state.version += 1;
                        state.content = content.clone();
                        state.record_index = datasets.len();
                        datasets.push(new_dataset(hum_id, &dataset_id, state.version, content, &rows));
                    }
                    state.record_index
                }
                None => {
                    states.insert(
                        dataset_id.clone(),
                        DatasetState {
                            version: 1,
                            content: content.clone(),
                            record_index: datasets.len(),
                        },
                    );
                    datasets.push(new_dataset(hum_id, &dataset_id, 1, content, &rows));
                    datasets.len() - 1
                }
            };
            let record = &mut datasets[record_index];
            if !record.hum_version_ids.contains(&pages.id) {
                record.hum_version_ids.push(pages.id.clone());
            }
            let reference = record.reference();
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }

        let (release_date, release_note) = release_info(&pages.id, &ordered);
        versions.push(HumVersion {
            hum_version_id: pages.id.clone(),
            hum_id: hum_id.clone(),
            version: pages.id.version(),
            release_date,
            release_note,
            datasets: refs,
        });
    }

    let research = Research {
        hum_id: hum_id.clone(),
        title: Bilingual::new(
            detail_title(latest, Lang::Ja).or_else(|| home_title.ja.clone()),
            detail_title(latest, Lang::En).or_else(|| home_title.en.clone()),
        ),
        summary: per_lang(latest, |detail| Some(detail.summary.clone())),
        data_provider: per_lang(latest, |detail| Some(detail.data_provider.clone())),
        publications: publications(latest),
        controlled_access_users: Bilingual::new(
            users(latest, Lang::Ja),
            users(latest, Lang::En),
        ),
        versions: versions
            .iter()
            .map(|version| VersionRef {
                hum_version_id: version.hum_version_id.clone(),
                release_date: version.release_date.clone(),
            })
            .collect(),
    };

    tracing::debug!(
        hum_id = %hum_id,
        versions = versions.len(),
        datasets = datasets.len(),
        "built project"
    );
    Ok(ProjectRecords {
        research,
        versions,
        datasets,
    })
}

/// Dataset ids listed by the version's summary tables, in page order, with
/// the row describing each id per language.
fn summary_datasets(pages: &VersionPages) -> Vec<(String, Bilingual<Option<SummaryDataset>>)> {
    let mut out: Vec<(String, Bilingual<Option<SummaryDataset>>)> = Vec::new();
    for lang in Lang::ALL {
        let Some(detail) = pages.detail.get(&lang) else {
            continue;
        };
        for row in &detail.summary.datasets {
            for id in &row.dataset_ids {
                let idx = match out.iter().position(|(known, _)| known == id) {
                    Some(idx) => idx,
                    None => {
                        out.push((id.clone(), Bilingual::default()));
                        out.len() - 1
                    }
                };
                let value = out[idx].1.get_mut(lang);
                if value.is_none() {
                    *value = Some(row.clone());
                }
            }
        }
    }
    out
}

fn dataset_content(
    dataset_id: &str,
    rows: &Bilingual<Option<SummaryDataset>>,
    pages: &VersionPages,
    mapping: &MappingTable,
) -> DatasetContent {
    let field = |lang: Lang, pick: fn(&SummaryDataset) -> String| {
        rows.get(lang)
            .as_ref()
            .map(pick)
            .filter(|value| !value.is_empty())
    };
    let type_of_data = |row: &SummaryDataset| row.type_of_data.text.clone();
    let criteria = |row: &SummaryDataset| row.criteria.clone();

    let tables = |lang: Lang| -> Vec<&MolecularTable> {
        pages
            .detail
            .get(&lang)
            .map(|detail| {
                detail
                    .molecular_data
                    .iter()
                    .filter(|table| table.ids.iter().any(|id| id_covers(id, dataset_id)))
                    .collect()
            })
            .unwrap_or_default()
    };
    let ja_tables = tables(Lang::Ja);
    let en_tables = tables(Lang::En);
    let count = ja_tables.len().max(en_tables.len());
    let experiments = (0..count)
        .map(|idx| {
            experiment(
                Bilingual::new(ja_tables.get(idx).copied(), en_tables.get(idx).copied()),
                mapping,
            )
        })
        .collect();

    DatasetContent {
        type_of_data: Bilingual::new(field(Lang::Ja, type_of_data), field(Lang::En, type_of_data)),
        criteria: Bilingual::new(field(Lang::Ja, criteria), field(Lang::En, criteria)),
        experiments,
    }
}

fn experiment(tables: Bilingual<Option<&MolecularTable>>, mapping: &MappingTable) -> Experiment {
    let mut experiment = Experiment::default();
    for lang in Lang::ALL {
        let Some(table) = tables.get(lang) else {
            continue;
        };
        *experiment.header.get_mut(lang) = table.header.clone();
        for row in &table.rows {
            let key = mapping.canonical_key(&row.key, lang);
            let slot = experiment.data.entry(key).or_default().get_mut(lang);
            if slot.is_none() {
                *slot = Some(row.value.clone());
            }
        }
    }
    experiment
}

fn new_dataset(
    hum_id: &HumId,
    dataset_id: &str,
    version: u32,
    content: DatasetContent,
    rows: &Bilingual<Option<SummaryDataset>>,
) -> Dataset {
    let release_date = rows
        .preferred()
        .and_then(|row| row.release_dates.first())
        .map(|date| normalize_date(date));
    Dataset {
        dataset_id: dataset_id.to_string(),
        version: format!("v{version}"),
        hum_id: hum_id.clone(),
        hum_version_ids: Vec::new(),
        type_of_data: content.type_of_data,
        criteria: content.criteria,
        release_date,
        experiments: content.experiments,
        original_metadata: OriginalMetadata::Unenriched,
    }
}

/// Release date and note for `id`, read from the newest release page that
/// mentions it.
fn release_info(
    id: &HumVersionId,
    ordered: &[&VersionPages],
) -> (Option<String>, Bilingual<Option<ReleaseNote>>) {
    let mut date = None;
    let mut note = Bilingual::default();
    for lang in Lang::ALL {
        let newest = ordered.iter().rev().find_map(|pages| {
            pages
                .release
                .get(&lang)
                .filter(|page| page.release(id).is_some() || page.section(id).is_some())
        });
        let Some(page) = newest else {
            continue;
        };
        if date.is_none() {
            date = page
                .release(id)
                .map(|row| normalize_date(&row.release_date));
        }
        *note.get_mut(lang) = page.section(id).map(|section| ReleaseNote {
            lines: section.lines.clone(),
            note: section.note.clone(),
        });
    }
    (date, note)
}

fn per_lang<T>(pages: &VersionPages, pick: impl Fn(&DetailPage) -> Option<T>) -> Bilingual<Option<T>> {
    Bilingual::new(
        pages.detail.get(&Lang::Ja).and_then(&pick),
        pages.detail.get(&Lang::En).and_then(&pick),
    )
}

/// True when a table id names `dataset_id`, either exactly or as an
/// inclusive `A-B` range with a shared prefix.
fn id_covers(token: &str, dataset_id: &str) -> bool {
    if token == dataset_id {
        return true;
    }
    let Some((start, end)) = token.split_once('-') else {
        return false;
    };
    let (Some((prefix, low)), Some((end_prefix, high)), Some((id_prefix, n))) = (
        split_numbered(start.trim()),
        split_numbered(end.trim()),
        split_numbered(dataset_id),
    ) else {
        return false;
    };
    prefix == end_prefix && prefix == id_prefix && (low..=high).contains(&n)
}

/// `JGAD000012` as `("JGAD", 12)`.
fn split_numbered(id: &str) -> Option<(&str, u64)> {
    let prefix_len = id.len() - id.trim_start_matches(|c: char| !c.is_ascii_digit()).len();
    let (prefix, number) = id.split_at(prefix_len);
    if prefix.is_empty() || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok().map(|n| (prefix, n))
}

fn detail_title(pages: &VersionPages, lang: Lang) -> Option<String> {
    pages.detail.get(&lang).and_then(|detail| detail.title.clone())
}

fn users(pages: &VersionPages, lang: Lang) -> Vec<ControlledAccessUser> {
    pages
        .detail
        .get(&lang)
        .map(|detail| detail.controlled_access_users.clone())
        .unwrap_or_default()
}

/// Publications of the ja and en pages paired by position.
fn publications(pages: &VersionPages) -> Vec<Publication> {
    let rows = |lang: Lang| {
        pages
            .detail
            .get(&lang)
            .map(|detail| detail.publications.as_slice())
            .unwrap_or_default()
    };
    let ja = rows(Lang::Ja);
    let en = rows(Lang::En);
    (0..ja.len().max(en.len()))
        .map(|idx| {
            let ja = ja.get(idx);
            let en = en.get(idx);
            let title = |row: Option<&PublicationRow>| {
                row.map(|row| row.title.text.clone())
                    .filter(|title| !title.is_empty())
            };
            Publication {
                title: Bilingual::new(title(ja), title(en)),
                doi: en
                    .and_then(|row| row.doi.clone())
                    .or_else(|| ja.and_then(|row| row.doi.clone())),
                dataset_ids: en
                    .or(ja)
                    .map(|row| row.dataset_ids.clone())
                    .unwrap_or_default(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::TextValue;
    use crate::parse::detail::MolecularRow;
    use crate::parse::release::{ReleaseRow, ReleaseSection};

    fn dataset_row(id: &str, type_of_data: &str) -> SummaryDataset {
        SummaryDataset {
            dataset_ids: vec![id.to_string()],
            type_of_data: TextValue::plain(type_of_data),
            criteria: "Controlled-access (Type I)".to_string(),
            release_dates: vec!["2015/07/01".to_string()],
        }
    }

    fn detail(rows: Vec<SummaryDataset>, platform: &str) -> DetailPage {
        let mut page = DetailPage::default();
        page.title = Some("Genome study".to_string());
        page.molecular_data = rows
            .iter()
            .map(|row| MolecularTable {
                header: None,
                ids: row.dataset_ids.clone(),
                rows: vec![MolecularRow {
                    key: "Platform".to_string(),
                    value: TextValue::plain(platform),
                }],
            })
            .collect();
        page.summary.datasets = rows;
        page
    }

    fn version(n: u32, page: DetailPage) -> VersionPages {
        let hum: HumId = "hum0001".parse().unwrap();
        let mut pages = VersionPages::new(hum.version(n));
        pages.detail.insert(Lang::En, page);
        pages
    }

    #[test]
    fn dates_are_normalized() {
        assert_eq!(normalize_date("2015/7/1"), "2015-07-01");
        assert_eq!(normalize_date(" 2015.07.01 "), "2015-07-01");
        assert_eq!(normalize_date("2015-07-01"), "2015-07-01");
        assert_eq!(normalize_date("coming soon"), "coming soon");
    }

    #[test]
    fn dataset_version_bumps_only_on_change() {
        let hum: HumId = "hum0001".parse().unwrap();
        let mapping = MappingTable::bundled().unwrap();
        let pages = vec![
            version(1, detail(vec![dataset_row("JGAD000001", "WGS")], "HiSeq")),
            version(2, detail(vec![dataset_row("JGAD000001", "WGS")], "HiSeq")),
            version(3, detail(vec![dataset_row("JGAD000001", "WGS")], "NovaSeq")),
        ];
        let records = build_project(&hum, &pages, &Bilingual::default(), &mapping).unwrap();

        let labels = records
            .versions
            .iter()
            .map(|version| version.datasets[0].version.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["v1", "v1", "v2"]);
        assert_eq!(records.datasets.len(), 2);
        assert_eq!(records.datasets[0].hum_version_ids.len(), 2);
        assert_eq!(records.datasets[0].release_date.as_deref(), Some("2015-07-01"));
        assert!(records.datasets[1].experiments[0].data.contains_key("Platform"));
    }

    #[test]
    fn research_uses_latest_version_and_release_page() {
        let hum: HumId = "hum0001".parse().unwrap();
        let mapping = MappingTable::bundled().unwrap();
        let mut first = detail(vec![dataset_row("JGAD000001", "WGS")], "HiSeq");
        first.publications.push(PublicationRow {
            title: TextValue::plain("Old paper"),
            doi: None,
            dataset_ids: vec![],
        });
        let mut second = detail(vec![dataset_row("JGAD000001", "WGS")], "HiSeq");
        second.publications.push(PublicationRow {
            title: TextValue::plain("New paper"),
            doi: Some("10.1000/xyz".to_string()),
            dataset_ids: vec!["JGAD000001".to_string()],
        });
        let mut v2 = version(2, second);
        let v1_id: HumVersionId = "hum0001-v1".parse().unwrap();
        v2.release.insert(
            Lang::En,
            ReleasePage {
                releases: vec![ReleaseRow {
                    hum_version_id: v1_id.clone(),
                    release_date: "2015/07/01".to_string(),
                    content: TextValue::plain("SNP-chip"),
                }],
                sections: vec![ReleaseSection {
                    hum_version_id: v1_id,
                    lines: vec!["Initial release".to_string()],
                    note: None,
                }],
                anomalies: vec![],
            },
        );
        let pages = vec![v2, version(1, first)];
        let home = Bilingual::new(Some("ゲノム研究".to_string()), None);

        let records = build_project(&hum, &pages, &home, &mapping).unwrap();
        assert_eq!(records.research.title.ja.as_deref(), Some("ゲノム研究"));
        assert_eq!(records.research.title.en.as_deref(), Some("Genome study"));
        assert_eq!(records.research.publications.len(), 1);
        assert_eq!(records.research.publications[0].doi.as_deref(), Some("10.1000/xyz"));
        assert_eq!(records.versions[0].release_date.as_deref(), Some("2015-07-01"));
        assert_eq!(
            records.versions[0].release_note.en.as_ref().unwrap().lines,
            vec!["Initial release"]
        );
        assert_eq!(records.research.latest_version().unwrap().hum_version_id.version(), 2);
    }

    #[test]
    fn range_headed_tables_reach_every_dataset_in_range() {
        assert!(id_covers("JGAD000001-JGAD000003", "JGAD000002"));
        assert!(id_covers("JGAD000001 - JGAD000003", "JGAD000003"));
        assert!(!id_covers("JGAD000001-JGAD000003", "JGAD000004"));
        assert!(!id_covers("JGAD000001-JGAD000003", "JGAS000002"));

        let hum: HumId = "hum0001".parse().unwrap();
        let mapping = MappingTable::bundled().unwrap();
        let mut page = detail(
            vec![dataset_row("JGAD000001", "WGS"), dataset_row("JGAD000002", "WGS")],
            "HiSeq",
        );
        page.molecular_data = vec![MolecularTable {
            header: None,
            ids: vec!["JGAD000001-JGAD000002".to_string()],
            rows: vec![MolecularRow {
                key: "Platform".to_string(),
                value: TextValue::plain("HiSeq"),
            }],
        }];
        let records =
            build_project(&hum, &[version(1, page)], &Bilingual::default(), &mapping).unwrap();

        assert_eq!(records.datasets.len(), 2);
        for dataset in &records.datasets {
            assert_eq!(dataset.experiments.len(), 1, "{}", dataset.dataset_id);
            assert!(dataset.experiments[0].data.contains_key("Platform"));
        }
    }

    #[test]
    fn no_pages_is_an_error() {
        let hum: HumId = "hum0009".parse().unwrap();
        let mapping = MappingTable::bundled().unwrap();
        assert!(build_project(&hum, &[], &Bilingual::default(), &mapping).is_err());
    }
}
