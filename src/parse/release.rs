use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::domain::HumVersionId;
use crate::error::CrawlError;
use crate::parse::html::{
    TextValue, article_root, element_children, is_header_row, row_cells, table_rows, tag_name,
    text_of,
};

const NOTE_MARKERS: &[&str] = &["Note:", "注：", "注:", "備考："];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleasePage {
    pub releases: Vec<ReleaseRow>,
    pub sections: Vec<ReleaseSection>,
    /// Elements the parser could not place, in document order.
    pub anomalies: Vec<String>,
}

impl ReleasePage {
    pub fn section(&self, id: &HumVersionId) -> Option<&ReleaseSection> {
        self.sections
            .iter()
            .find(|section| &section.hum_version_id == id)
    }

    pub fn release(&self, id: &HumVersionId) -> Option<&ReleaseRow> {
        self.releases.iter().find(|row| &row.hum_version_id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRow {
    pub hum_version_id: HumVersionId,
    pub release_date: String,
    pub content: TextValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSection {
    pub hum_version_id: HumVersionId,
    pub lines: Vec<String>,
    pub note: Option<String>,
}

#[derive(Debug, Default)]
enum Open {
    #[default]
    Nothing,
    /// Heading without a humVersionId; its paragraphs are dropped.
    Discarded,
    Section(HumVersionId),
}

/// State carried across the fold over the page's top-level elements.
#[derive(Debug, Default)]
struct Fold {
    open: Open,
    pending_lines: Vec<String>,
    note: Option<String>,
    page: ReleasePage,
}

impl Fold {
    fn anomaly(&mut self, page: &str, message: String) {
        tracing::warn!(page, "{message}");
        self.page.anomalies.push(message);
    }

    fn flush(&mut self) {
        let lines = std::mem::take(&mut self.pending_lines);
        let note = self.note.take();
        if let Open::Section(id) = std::mem::take(&mut self.open) {
            self.page.sections.push(ReleaseSection {
                hum_version_id: id,
                lines: lines.into_iter().filter(|line| !line.trim().is_empty()).collect(),
                note,
            });
        }
    }

    fn heading(&mut self, element: ElementRef<'_>, page: &str) {
        self.flush();
        let heading = text_of(element);
        match HumVersionId::find_in(&heading) {
            Some(id) => self.open = Open::Section(id),
            None => {
                self.open = Open::Discarded;
                self.anomaly(page, format!("release heading without version id: {heading:?}"));
            }
        }
    }

    fn paragraph(&mut self, element: ElementRef<'_>, page: &str) {
        let text = text_of(element);
        match self.open {
            Open::Section(_) => {}
            Open::Discarded => return,
            Open::Nothing => {
                if !text.is_empty() {
                    self.anomaly(page, format!("paragraph outside any release: {text:?}"));
                }
                return;
            }
        }
        match strip_note_marker(&text) {
            Some(note) => {
                self.note = Some(match self.note.take() {
                    Some(existing) => format!("{existing}\n{note}"),
                    None => note.to_string(),
                });
            }
            None => self.pending_lines.push(text),
        }
    }

    fn table(&mut self, element: ElementRef<'_>, page: &str) -> Result<(), CrawlError> {
        for (idx, row) in table_rows(element).into_iter().enumerate() {
            if is_header_row(row) {
                continue;
            }
            let cells = row_cells(row);
            if cells.len() < 3 {
                return Err(CrawlError::parse(
                    page,
                    format!("release row {idx} has {} cells, expected at least 3", cells.len()),
                ));
            }
            let raw_id = text_of(cells[0]);
            let hum_version_id = raw_id.parse::<HumVersionId>().map_err(|_| {
                CrawlError::parse(page, format!("release row {idx}: bad version id {raw_id:?}"))
            })?;
            self.page.releases.push(ReleaseRow {
                hum_version_id,
                release_date: text_of(cells[1]),
                content: TextValue::from_element(cells[2]),
            });
        }
        Ok(())
    }
}

fn strip_note_marker(text: &str) -> Option<&str> {
    NOTE_MARKERS
        .iter()
        .find_map(|marker| text.strip_prefix(marker))
        .map(str::trim)
}

/// Parses a release-history page. `page` names the page in error messages.
pub fn parse_release(html: &str, page: &str) -> Result<ReleasePage, CrawlError> {
    let doc = Html::parse_document(html);
    let root = article_root(&doc, page)?;

    let mut fold = Fold::default();
    for element in element_children(root) {
        match tag_name(&element) {
            "table" => fold.table(element, page)?,
            "h2" => fold.heading(element, page),
            "p" => fold.paragraph(element, page),
            other => fold.anomaly(page, format!("unexpected <{other}> element")),
        }
    }
    fold.flush();
    Ok(fold.page)
}
