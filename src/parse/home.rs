use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Serialize;

use crate::domain::HumId;
use crate::error::CrawlError;
use crate::parse::html::{article_root, first_href, row_cells, table_rows, tag_name, text_of};
use crate::portal::Portal;

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid table selector"));

/// The portal's index of research projects.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HomeIndex {
    /// Title per project; a later row for the same humId replaces an
    /// earlier one.
    pub titles: BTreeMap<HumId, String>,
    /// Every humId in first-seen order, without duplicates.
    pub hum_ids: Vec<HumId>,
}

pub fn parse_home(html: &str, portal: &Portal) -> Result<HomeIndex, CrawlError> {
    const PAGE: &str = "home page";
    let doc = Html::parse_document(html);
    let root = article_root(&doc, PAGE)?;
    let table = root
        .select(&TABLE)
        .next()
        .ok_or_else(|| CrawlError::parse(PAGE, "no research table"))?;

    let mut index = HomeIndex::default();
    for (row_idx, row) in table_rows(table).into_iter().enumerate() {
        let cells = row_cells(row);
        if !cells.iter().any(|cell| tag_name(cell) == "td") {
            continue;
        }
        let href = first_href(cells[0]).ok_or_else(|| {
            CrawlError::parse(PAGE, format!("row {row_idx}: no anchor in first cell"))
        })?;
        let version_id = portal.parse_detail_href(&href).ok_or_else(|| {
            CrawlError::parse(
                PAGE,
                format!("row {row_idx}: href {href:?} is not a detail page"),
            )
        })?;
        let title_cell = cells.get(1).ok_or_else(|| {
            CrawlError::parse(PAGE, format!("row {row_idx}: no title cell"))
        })?;

        let hum_id = version_id.hum_id().clone();
        if !index.titles.contains_key(&hum_id) {
            index.hum_ids.push(hum_id.clone());
        }
        index.titles.insert(hum_id, text_of(*title_cell));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn page(rows: &str) -> String {
        format!(
            "<html><body><div itemprop=\"articleBody\"><table>\
             <tr><th>Research ID</th><th>Title</th></tr>{rows}</table></div></body></html>"
        )
    }

    #[test]
    fn rows_become_titles() {
        let html = page(
            "<tr><td><a href=\"/hum0001-v1\">hum0001.v1</a></td><td>Gastric cancer</td></tr>\
             <tr><td><a href=\"/hum0002-v3\">hum0002.v3</a></td><td> Type 2 <b>diabetes</b> </td></tr>",
        );
        let index = parse_home(&html, &Portal::default()).unwrap();
        assert_eq!(index.hum_ids.len(), 2);
        let hum0002: HumId = "hum0002".parse().unwrap();
        assert_eq!(index.titles[&hum0002], "Type 2 diabetes");
    }

    #[test]
    fn repeated_project_keeps_the_later_title() {
        let html = page(
            "<tr><td><a href=\"/hum0001-v1\">hum0001.v1</a></td><td>Old</td></tr>\
             <tr><td><a href=\"/hum0001-v2\">hum0001.v2</a></td><td>New</td></tr>",
        );
        let index = parse_home(&html, &Portal::default()).unwrap();
        let hum0001: HumId = "hum0001".parse().unwrap();
        assert_eq!(index.hum_ids, vec![hum0001.clone()]);
        assert_eq!(index.titles[&hum0001], "New");
    }

    #[test]
    fn missing_anchor_is_an_error() {
        let html = page("<tr><td>hum0001.v1</td><td>Gastric cancer</td></tr>");
        let err = parse_home(&html, &Portal::default()).unwrap_err();
        assert_matches!(err, CrawlError::Parse { .. });
    }

    #[test]
    fn missing_title_cell_is_an_error() {
        let html = page("<tr><td><a href=\"/hum0001-v1\">hum0001.v1</a></td></tr>");
        assert_matches!(
            parse_home(&html, &Portal::default()),
            Err(CrawlError::Parse { .. })
        );
    }
}
