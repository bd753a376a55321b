//! DOM helpers shared by the page parsers.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

static ARTICLE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["[itemprop=\"articleBody\"]", ".articleBody", "body"]
        .iter()
        .map(|value| Selector::parse(value).expect("valid article selector"))
        .collect()
});
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[-‐–—~〜～]\s*").expect("valid range pattern"));
static ID_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,、，;；]+").expect("valid separator pattern"));

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const LINE_BLOCKS: &[&str] = &["p", "div", "li", "tr", "h1", "h2", "h3", "h4"];
const STRIPPED_ATTRS: &[&str] = &["style", "class"];

/// Plain text plus the cleaned HTML it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
    pub html: String,
}

impl TextValue {
    pub fn from_element(element: ElementRef<'_>) -> Self {
        Self {
            text: text_of(element),
            html: cleaned_html(element),
        }
    }

    pub fn plain(text: &str) -> Self {
        let text = collapse_whitespace(text);
        Self {
            html: escape_text(&text),
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// The element holding the page's article content.
pub fn article_root<'a>(doc: &'a Html, page: &str) -> Result<ElementRef<'a>, CrawlError> {
    ARTICLE_SELECTORS
        .iter()
        .find_map(|selector| doc.select(selector).next())
        .ok_or_else(|| CrawlError::parse(page, "no article body"))
}

pub fn tag_name<'a>(element: &ElementRef<'a>) -> &'a str {
    element.value().name()
}

pub fn element_children<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE_RE.replace_all(value.trim(), " ").into_owned()
}

pub fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Inner HTML with `style` and `class` attributes removed. Nested tags and
/// every other attribute survive; comments are dropped.
pub fn cleaned_html(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_children(element, &mut out);
    collapse_whitespace(&out)
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&escape_text(text));
        } else if let Some(child) = ElementRef::wrap(child) {
            write_element(child, out);
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    out.push('<');
    out.push_str(name);
    for (key, value) in element.value().attrs() {
        if STRIPPED_ATTRS.contains(&key) {
            continue;
        }
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    write_children(element, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Splits a cell at `<br>` (and block boundaries) into trimmed, non-empty
/// lines.
pub fn split_lines(element: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    collect_lines(element, &mut current, &mut lines);
    flush_line(&mut current, &mut lines);
    lines
}

fn collect_lines(element: ElementRef<'_>, current: &mut String, lines: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            current.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();
        if name == "br" {
            flush_line(current, lines);
        } else if LINE_BLOCKS.contains(&name) {
            flush_line(current, lines);
            collect_lines(child, current, lines);
            flush_line(current, lines);
        } else {
            collect_lines(child, current, lines);
        }
    }
}

fn flush_line(current: &mut String, lines: &mut Vec<String>) {
    let line = collapse_whitespace(current);
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}

/// Splits an id cell into tokens. `A - B` ranges collapse into the single
/// literal `A-B`; they are never expanded.
pub fn split_ids(element: ElementRef<'_>) -> Vec<String> {
    split_lines(element)
        .iter()
        .flat_map(|line| split_id_text(line))
        .collect()
}

pub fn split_id_text(text: &str) -> Vec<String> {
    let joined = RANGE_RE.replace_all(text.trim(), "-");
    ID_SEPARATOR_RE
        .split(&joined)
        .map(|token| token.trim_matches(|ch: char| ch == '(' || ch == ')'))
        .filter(|token| !token.is_empty() && *token != "-")
        .map(|token| token.to_string())
        .collect()
}

/// Rows of a table, looking through `thead`/`tbody`/`tfoot` but not into
/// nested tables.
pub fn table_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows = Vec::new();
    for child in element_children(table) {
        match tag_name(&child) {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(element_children(child).filter(|row| tag_name(row) == "tr"));
            }
            _ => {}
        }
    }
    rows
}

pub fn row_cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    element_children(row)
        .filter(|cell| matches!(tag_name(cell), "td" | "th"))
        .collect()
}

/// Header rows carry only `th` cells.
pub fn is_header_row(row: ElementRef<'_>) -> bool {
    let cells = row_cells(row);
    !cells.is_empty() && cells.iter().all(|cell| tag_name(cell) == "th")
}

/// Block-level elements in document order, descending through wrapper
/// containers but not into headings, paragraphs, lists or tables.
pub fn flatten_blocks<'a>(root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut blocks = Vec::new();
    push_blocks(root, &mut blocks);
    blocks
}

fn push_blocks<'a>(element: ElementRef<'a>, blocks: &mut Vec<ElementRef<'a>>) {
    for child in element_children(element) {
        match tag_name(&child) {
            "h1" | "h2" | "h3" | "h4" | "p" | "table" | "ul" | "ol" => blocks.push(child),
            "div" | "section" | "article" | "main" => push_blocks(child, blocks),
            _ => {}
        }
    }
}

/// First anchor `href` under the element.
pub fn first_href(element: ElementRef<'_>) -> Option<String> {
    static ANCHOR: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));
    element
        .select(&ANCHOR)
        .next()
        .and_then(|anchor| anchor.value().attr("href"))
        .map(|href| href.trim().to_string())
}

/// Every `(text, href)` anchor pair under the element.
pub fn anchors(element: ElementRef<'_>) -> Vec<(String, String)> {
    static ANCHOR: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));
    element
        .select(&ANCHOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim().to_string();
            Some((text_of(anchor), href))
        })
        .collect()
}
