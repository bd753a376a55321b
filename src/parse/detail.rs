use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::parse::html::{
    TextValue, anchors, article_root, flatten_blocks, is_header_row, row_cells, split_ids,
    split_lines, table_rows, tag_name, text_of,
};

static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.\d{4,9}/[^\s<>]+").expect("valid DOI pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    MolecularData,
    DataProvider,
    Publications,
    ControlledAccessUsers,
}

impl Section {
    fn from_heading(heading: &str) -> Option<Self> {
        let upper = heading.to_uppercase();
        if heading.contains("制限公開データの利用者一覧") || upper.contains("USERS") {
            Some(Section::ControlledAccessUsers)
        } else if heading.contains("研究内容の概要") || upper.contains("SUMMARY") {
            Some(Section::Summary)
        } else if heading.contains("分子データ") || upper.contains("MOLECULAR DATA") {
            Some(Section::MolecularData)
        } else if heading.contains("提供者情報") || upper.contains("DATA PROVIDER") {
            Some(Section::DataProvider)
        } else if heading.contains("関連論文") || upper.contains("PUBLICATION") {
            Some(Section::Publications)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SummaryBlock {
    Aims,
    Methods,
    Targets,
    Url,
    Other,
}

impl SummaryBlock {
    fn from_heading(heading: &str) -> Self {
        let lower = heading.to_lowercase();
        if heading.contains("目的") || lower.contains("aims") {
            SummaryBlock::Aims
        } else if heading.contains("方法") || lower.contains("methods") {
            SummaryBlock::Methods
        } else if heading.contains("対象") || lower.contains("participants") {
            SummaryBlock::Targets
        } else if lower.contains("url") {
            SummaryBlock::Url
        } else {
            SummaryBlock::Other
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailPage {
    pub title: Option<String>,
    pub summary: Summary,
    pub molecular_data: Vec<MolecularTable>,
    pub data_provider: DataProvider,
    pub publications: Vec<PublicationRow>,
    pub controlled_access_users: Vec<ControlledAccessUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub aims: Vec<TextValue>,
    pub methods: Vec<TextValue>,
    pub targets: Vec<TextValue>,
    pub url: Vec<Link>,
    pub datasets: Vec<SummaryDataset>,
    pub footers: Vec<TextValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDataset {
    pub dataset_ids: Vec<String>,
    pub type_of_data: TextValue,
    pub criteria: String,
    pub release_dates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MolecularTable {
    pub header: Option<TextValue>,
    pub ids: Vec<String>,
    pub rows: Vec<MolecularRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MolecularRow {
    pub key: String,
    pub value: TextValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataProvider {
    pub principal_investigators: Vec<String>,
    pub affiliations: Vec<String>,
    pub project_names: Vec<String>,
    pub project_titles: Vec<String>,
    pub grants: Vec<Grant>,
    pub others: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub name: String,
    pub title: String,
    pub id: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationRow {
    pub title: TextValue,
    pub doi: Option<String>,
    pub dataset_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlledAccessUser {
    pub principal_investigator: String,
    pub affiliation: String,
    pub country: String,
    pub research_title: String,
    pub dataset_ids: Vec<String>,
    pub period_of_data_use: String,
}

/// Parses a research detail page. `page` names the page in error messages.
pub fn parse_detail(html: &str, page: &str) -> Result<DetailPage, CrawlError> {
    let doc = Html::parse_document(html);
    let root = article_root(&doc, page)?;

    let mut detail = DetailPage::default();
    let mut section: Option<Section> = None;
    let mut seen_summary = false;
    let mut summary_block = SummaryBlock::Other;
    let mut pending_header: Option<TextValue> = None;

    for block in flatten_blocks(root) {
        match tag_name(&block) {
            "h1" => {
                if detail.title.is_none() {
                    detail.title = Some(text_of(block)).filter(|title| !title.is_empty());
                }
            }
            "h2" => {
                let heading = text_of(block);
                section = Section::from_heading(&heading);
                summary_block = SummaryBlock::Other;
                pending_header = None;
                match section {
                    Some(Section::Summary) => seen_summary = true,
                    Some(_) => {}
                    None => tracing::warn!(page, heading, "skipping unknown section"),
                }
            }
            "h3" | "h4" => {
                summary_block = SummaryBlock::from_heading(&text_of(block));
                pending_header = None;
            }
            "table" => match section {
                Some(Section::Summary) => {
                    if detail.summary.datasets.is_empty() {
                        detail.summary.datasets = parse_dataset_table(block, page)?;
                    } else {
                        tracing::debug!(page, "ignoring extra summary table");
                    }
                }
                Some(Section::MolecularData) => {
                    let table = parse_molecular_table(block, pending_header.take(), page)?;
                    detail.molecular_data.push(table);
                }
                Some(Section::DataProvider) => {
                    detail.data_provider.grants.extend(parse_grant_table(block, page)?);
                }
                Some(Section::Publications) => {
                    detail.publications.extend(parse_publication_table(block, page)?);
                }
                Some(Section::ControlledAccessUsers) => {
                    detail
                        .controlled_access_users
                        .extend(parse_user_table(block, page)?);
                }
                None => {}
            },
            _ => match section {
                Some(Section::Summary) => {
                    push_summary_text(&mut detail.summary, summary_block, block);
                }
                Some(Section::MolecularData) => {
                    let value = TextValue::from_element(block);
                    if !value.is_empty() {
                        pending_header = Some(value);
                    }
                }
                Some(Section::DataProvider) => {
                    for line in split_lines(block) {
                        push_provider_line(&mut detail.data_provider, &line);
                    }
                }
                _ => {}
            },
        }
    }

    if !seen_summary {
        return Err(CrawlError::parse(page, "no summary section"));
    }
    Ok(detail)
}

fn push_summary_text(summary: &mut Summary, block: SummaryBlock, element: ElementRef<'_>) {
    let value = TextValue::from_element(element);
    if value.is_empty() {
        return;
    }
    match block {
        SummaryBlock::Aims => summary.aims.push(value),
        SummaryBlock::Methods => summary.methods.push(value),
        SummaryBlock::Targets => summary.targets.push(value),
        SummaryBlock::Url => {
            let links = anchors(element);
            if links.is_empty() {
                summary.url.push(Link {
                    text: value.text.clone(),
                    url: value.text,
                });
            } else {
                summary
                    .url
                    .extend(links.into_iter().map(|(text, url)| Link { text, url }));
            }
        }
        SummaryBlock::Other => summary.footers.push(value),
    }
}

fn push_provider_line(provider: &mut DataProvider, line: &str) {
    let Some((label, value)) = line.split_once([':', '：']) else {
        provider.others.push(line.to_string());
        return;
    };
    let value = value.trim().to_string();
    let lower = label.trim().to_lowercase();
    if lower.contains("principal investigator") || label.contains("研究代表者") {
        provider.principal_investigators.push(value);
    } else if lower.contains("affiliation") || label.contains("所属") {
        provider.affiliations.push(value);
    } else if lower.contains("group name") || label.contains("研究グループ") {
        provider.project_names.push(value);
    } else if lower.contains("project title") || label.contains("科研費") || label.contains("助成金")
    {
        provider.project_titles.push(value);
    } else {
        provider.others.push(line.to_string());
    }
}

/// Body rows of a table with at least `min_cells` cells each.
fn body_rows<'a>(
    table: ElementRef<'a>,
    min_cells: usize,
    what: &str,
    page: &str,
) -> Result<Vec<Vec<ElementRef<'a>>>, CrawlError> {
    let mut rows = Vec::new();
    for (idx, row) in table_rows(table).into_iter().enumerate() {
        if is_header_row(row) {
            continue;
        }
        let cells = row_cells(row);
        if cells.len() < min_cells {
            return Err(CrawlError::parse(
                page,
                format!(
                    "{what} row {idx} has {} cells, expected at least {min_cells}",
                    cells.len()
                ),
            ));
        }
        rows.push(cells);
    }
    Ok(rows)
}

fn parse_dataset_table(table: ElementRef<'_>, page: &str) -> Result<Vec<SummaryDataset>, CrawlError> {
    Ok(body_rows(table, 4, "dataset", page)?
        .into_iter()
        .map(|cells| SummaryDataset {
            dataset_ids: split_ids(cells[0]),
            type_of_data: TextValue::from_element(cells[1]),
            criteria: text_of(cells[2]),
            release_dates: split_lines(cells[3]),
        })
        .collect())
}

fn parse_molecular_table(
    table: ElementRef<'_>,
    header: Option<TextValue>,
    page: &str,
) -> Result<MolecularTable, CrawlError> {
    let rows = table_rows(table);
    let mut body = rows.as_slice();
    let mut ids = Vec::new();
    if let Some(first) = rows.first() {
        let cells = row_cells(*first);
        if cells.len() == 1 {
            ids = split_ids(cells[0]);
            body = &rows[1..];
        }
    }
    if ids.is_empty() {
        if let Some(header) = &header {
            ids = crate::parse::html::split_id_text(&header.text);
        }
    }

    let mut parsed = Vec::with_capacity(body.len());
    for (idx, row) in body.iter().enumerate() {
        let cells = row_cells(*row);
        if cells.len() != 2 {
            return Err(CrawlError::parse(
                page,
                format!(
                    "molecular data row {idx} has {} cells, expected 2",
                    cells.len()
                ),
            ));
        }
        parsed.push(MolecularRow {
            key: text_of(cells[0]),
            value: TextValue::from_element(cells[1]),
        });
    }
    Ok(MolecularTable {
        header,
        ids,
        rows: parsed,
    })
}

fn parse_grant_table(table: ElementRef<'_>, page: &str) -> Result<Vec<Grant>, CrawlError> {
    Ok(body_rows(table, 3, "grant", page)?
        .into_iter()
        .map(|cells| Grant {
            name: text_of(cells[0]),
            title: text_of(cells[1]),
            id: split_lines(cells[2]),
        })
        .collect())
}

fn parse_publication_table(
    table: ElementRef<'_>,
    page: &str,
) -> Result<Vec<PublicationRow>, CrawlError> {
    Ok(body_rows(table, 4, "publication", page)?
        .into_iter()
        .map(|cells| PublicationRow {
            title: TextValue::from_element(cells[1]),
            doi: extract_doi(cells[2]),
            dataset_ids: split_ids(cells[3]),
        })
        .collect())
}

fn parse_user_table(
    table: ElementRef<'_>,
    page: &str,
) -> Result<Vec<ControlledAccessUser>, CrawlError> {
    Ok(body_rows(table, 6, "controlled-access user", page)?
        .into_iter()
        .map(|cells| ControlledAccessUser {
            principal_investigator: text_of(cells[0]),
            affiliation: text_of(cells[1]),
            country: text_of(cells[2]),
            research_title: text_of(cells[3]),
            dataset_ids: split_ids(cells[4]),
            period_of_data_use: text_of(cells[5]),
        })
        .collect())
}

fn extract_doi(cell: ElementRef<'_>) -> Option<String> {
    let mut candidates = anchors(cell)
        .into_iter()
        .flat_map(|(text, href)| [href, text])
        .collect::<Vec<_>>();
    candidates.push(text_of(cell));
    candidates
        .iter()
        .find_map(|candidate| normalize_doi(candidate))
}

/// Bare DOI out of `10.x/…` or a resolver URL. Trailing punctuation is not
/// part of the DOI.
pub fn normalize_doi(value: &str) -> Option<String> {
    let found = DOI_RE.find(value)?;
    let doi = found
        .as_str()
        .trim_end_matches(['.', ',', ';', ')', ']'])
        .to_string();
    Some(doi)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const PAGE_JA: &str = r#"<html><body><div itemprop="articleBody">
<h1>日本人の2型糖尿病に関する研究</h1>
<h2>研究内容の概要</h2>
<h3>目的</h3><p style="margin:0">2型糖尿病の<b>感受性遺伝子</b>を同定する</p>
<h3>方法</h3><p>GWAS</p>
<h3>対象</h3><p>日本人 2型糖尿病患者 9,817名</p>
<h3>URL</h3><p><a href="https://example.org/t2d">https://example.org/t2d</a></p>
<table>
<tr><th>データID</th><th>データの種類</th><th>制限</th><th>公開日</th></tr>
<tr><td>JGAD000001<br>JGAD000002</td><td>SNPタイピング</td><td>制限公開 (Type I)</td><td>2013/10/15</td></tr>
</table>
<h2>分子データ</h2>
<p>JGAS000001</p>
<table>
<tr><th colspan="2">JGAD000001 - JGAD000002</th></tr>
<tr><th>規模</th><td>ゲノムワイド</td></tr>
<tr><th>Platform</th><td>Illumina <span class="x">HumanOmni</span></td></tr>
</table>
<h2>提供者情報</h2>
<p>研究代表者：山田 太郎<br>所属機関：理化学研究所</p>
<p>プロジェクト/研究グループ名：糖尿病ゲノム研究グループ</p>
<table><tr><th>科研費・助成金名</th><th>タイトル</th><th>番号</th></tr>
<tr><td>AMED</td><td>糖尿病研究</td><td>JP123</td></tr></table>
<h2>関連論文</h2>
<table>
<tr><th>#</th><th>タイトル</th><th>DOI</th><th>データID</th></tr>
<tr><td>1</td><td>A genome-wide association study</td><td><a href="https://doi.org/10.1038/ng.1234">doi:10.1038/ng.1234</a></td><td>JGAD000001</td></tr>
<tr><td>2</td><td>Follow-up study</td><td>In submission</td><td>JGAD000002</td></tr>
</table>
<h2>制限公開データの利用者一覧</h2>
<table>
<tr><th>研究代表者</th><th>所属機関</th><th>国・州名</th><th>研究題目</th><th>利用データID</th><th>利用期間</th></tr>
<tr><td>佐藤 花子</td><td>東京大学</td><td>日本</td><td>糖尿病研究</td><td>JGAD000001</td><td>2014/01/01-2016/12/31</td></tr>
</table>
</div></body></html>"#;

    #[test]
    fn parses_all_sections() {
        let detail = parse_detail(PAGE_JA, "hum0001-v1-ja").unwrap();
        assert_eq!(detail.title.as_deref(), Some("日本人の2型糖尿病に関する研究"));

        let summary = &detail.summary;
        assert_eq!(summary.aims[0].html, "2型糖尿病の<b>感受性遺伝子</b>を同定する");
        assert_eq!(summary.url[0].url, "https://example.org/t2d");
        assert_eq!(summary.datasets.len(), 1);
        assert_eq!(summary.datasets[0].dataset_ids, vec!["JGAD000001", "JGAD000002"]);
        assert_eq!(summary.datasets[0].release_dates, vec!["2013/10/15"]);

        let molecular = &detail.molecular_data[0];
        assert_eq!(molecular.ids, vec!["JGAD000001-JGAD000002"]);
        assert_eq!(molecular.header.as_ref().unwrap().text, "JGAS000001");
        assert_eq!(molecular.rows.len(), 2);
        assert_eq!(molecular.rows[1].value.html, "Illumina <span>HumanOmni</span>");

        assert_eq!(detail.data_provider.principal_investigators, vec!["山田 太郎"]);
        assert_eq!(detail.data_provider.affiliations, vec!["理化学研究所"]);
        assert_eq!(detail.data_provider.project_names, vec!["糖尿病ゲノム研究グループ"]);
        assert_eq!(detail.data_provider.grants[0].id, vec!["JP123"]);

        assert_eq!(detail.publications.len(), 2);
        assert_eq!(detail.publications[0].doi.as_deref(), Some("10.1038/ng.1234"));
        assert_eq!(detail.publications[1].doi, None);

        assert_eq!(detail.controlled_access_users[0].dataset_ids, vec!["JGAD000001"]);
    }

    #[test]
    fn missing_summary_is_an_error() {
        let html = "<html><body><h2>PUBLICATIONS</h2></body></html>";
        assert_matches!(parse_detail(html, "p"), Err(CrawlError::Parse { .. }));
    }

    #[test]
    fn short_publication_row_is_an_error() {
        let html = "<html><body><h2>SUMMARY</h2><h2>PUBLICATIONS</h2>\
                    <table><tr><td>1</td><td>Title only</td></tr></table></body></html>";
        assert_matches!(parse_detail(html, "p"), Err(CrawlError::Parse { .. }));
    }

    #[test]
    fn doi_normalization() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1016/j.cell.2020.01.001.").as_deref(),
            Some("10.1016/j.cell.2020.01.001")
        );
        assert_eq!(normalize_doi("In press"), None);
    }
}
