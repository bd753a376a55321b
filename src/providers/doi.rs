use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::CrawlError;
use crate::http::{HttpGet, build_query_url};
use crate::parse::detail::normalize_doi;
use crate::providers::cache::ExternalCache;
use crate::providers::{Lookup, Source, Throttle, run_batch};
use crate::store::Store;

pub const DEFAULT_CROSSREF_BASE: &str = "https://api.crossref.org";
const REGISTRY: &str = "crossref";
const SEARCH_ROWS: &str = "5";
const SLUG_LIMIT: usize = 80;
const LOOKBACK_YEARS: i32 = 3;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year pattern"));

/// A publication to find a DOI for. A query that already carries a DOI is
/// answered without a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoiQuery {
    pub title: String,
    pub existing: Option<String>,
}

/// Title-to-DOI search over a batch of publications from one project.
/// `date_hint` is any date-ish text near the publications, such as the
/// project's latest release date.
pub trait DoiSearch {
    fn search_batch(
        &self,
        queries: &[DoiQuery],
        date_hint: Option<&str>,
        use_cache: bool,
    ) -> Vec<(String, Result<Option<String>, CrawlError>)>;
}

#[derive(Debug, Deserialize)]
struct CrossrefSearchResponse {
    message: CrossrefSearchMessage,
}

#[derive(Debug, Deserialize)]
struct CrossrefSearchMessage {
    #[serde(default)]
    items: Vec<CrossrefItem>,
}

#[derive(Debug, Deserialize)]
struct CrossrefItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
}

pub struct CrossrefClient<H: HttpGet> {
    http: H,
    base_url: String,
    mailto: Option<String>,
    cache: ExternalCache,
    throttle: Throttle,
}

impl<H: HttpGet> CrossrefClient<H> {
    pub fn new(http: H, store: &Store, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            mailto: None,
            cache: ExternalCache::new(store, REGISTRY),
            throttle: Throttle::default(),
        }
    }

    pub fn with_mailto(mut self, mailto: Option<String>) -> Self {
        self.mailto = mailto.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn search_url(&self, title: &str, date_hint: Option<&str>) -> String {
        let filter = date_hint
            .and_then(hint_year)
            .map(|year| format!("from-pub-date:{}", year - LOOKBACK_YEARS));
        let mut params = vec![("query.bibliographic", title), ("rows", SEARCH_ROWS)];
        if let Some(filter) = filter.as_deref() {
            params.push(("filter", filter));
        }
        if let Some(mailto) = self.mailto.as_deref() {
            params.push(("mailto", mailto));
        }
        build_query_url(&format!("{}/works", self.base_url), &params)
    }

    /// Searches one title. The metadata is `{"title", "doi"}` on a match.
    pub fn search(
        &self,
        title: &str,
        date_hint: Option<&str>,
        use_cache: bool,
    ) -> Result<Lookup, CrawlError> {
        let key = cache_key(title, date_hint);
        if use_cache {
            if let Some(entry) = self.cache.read(&key)? {
                tracing::debug!(key = %key, "crossref cache hit");
                return Ok(Lookup {
                    metadata: entry.into_metadata(),
                    source: Source::Cache,
                });
            }
        }

        let response = self
            .http
            .get(&self.search_url(title, date_hint))
            .map_err(CrawlError::CrossrefHttp)?;
        let network_miss = |cache: &ExternalCache| -> Result<Lookup, CrawlError> {
            cache.write_not_found(&key)?;
            Ok(Lookup {
                metadata: None,
                source: Source::Network,
            })
        };
        if response.status == 404 {
            return network_miss(&self.cache);
        }
        if !response.is_success() {
            return Err(CrawlError::CrossrefStatus {
                status: response.status,
                message: response.body.chars().take(200).collect(),
            });
        }
        let payload: CrossrefSearchResponse = serde_json::from_str(&response.body)
            .map_err(|err| CrawlError::CrossrefHttp(format!("invalid search response: {err}")))?;

        match best_match(title, &payload.message.items) {
            Some(doi) => {
                let value = json!({"title": title, "doi": doi});
                self.cache.write_found(&key, &value)?;
                Ok(Lookup {
                    metadata: Some(value),
                    source: Source::Network,
                })
            }
            None => {
                tracing::debug!(title, "no crossref match");
                network_miss(&self.cache)
            }
        }
    }
}

impl<H: HttpGet> DoiSearch for CrossrefClient<H> {
    fn search_batch(
        &self,
        queries: &[DoiQuery],
        date_hint: Option<&str>,
        use_cache: bool,
    ) -> Vec<(String, Result<Option<String>, CrawlError>)> {
        let mut answers = Vec::with_capacity(queries.len());
        let mut pending = Vec::new();
        for query in queries {
            match &query.existing {
                Some(doi) => answers.push((query.title.clone(), Ok(Some(doi.clone())))),
                None => pending.push(query.title.clone()),
            }
        }
        let results = run_batch(&pending, self.throttle, |title| {
            self.search(title, date_hint, use_cache)
        });
        for (title, result) in pending.into_iter().zip(results) {
            let doi = result.map(|lookup| lookup.metadata.as_ref().and_then(doi_of));
            answers.push((title, doi));
        }
        answers
    }
}

fn doi_of(metadata: &Value) -> Option<String> {
    metadata
        .get("doi")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn hint_year(hint: &str) -> Option<i32> {
    YEAR_RE.find(hint)?.as_str().parse().ok()
}

/// Lowercase alphanumerics only, so punctuation and markup differences do
/// not defeat an exact title match.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn best_match(title: &str, items: &[CrossrefItem]) -> Option<String> {
    let wanted = normalize_title(title);
    if wanted.is_empty() {
        return None;
    }
    items.iter().find_map(|item| {
        let matches = item
            .title
            .iter()
            .flatten()
            .any(|candidate| normalize_title(candidate) == wanted);
        if matches {
            item.doi.as_deref().and_then(normalize_doi)
        } else {
            None
        }
    })
}

/// Title slug plus a hash of `title|hint`, so different hints for the same
/// title are cached apart.
pub fn cache_key(title: &str, date_hint: Option<&str>) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= SLUG_LIMIT {
            break;
        }
    }
    let slug = slug.trim_matches('-');
    let hash = fnv1a(&format!("{title}|{}", date_hint.unwrap_or_default()));
    if slug.is_empty() {
        format!("{hash:016x}")
    } else {
        format!("{slug}-{hash:016x}")
    }
}

fn fnv1a(value: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    value.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(doi: &str, title: &str) -> CrossrefItem {
        CrossrefItem {
            doi: Some(doi.to_string()),
            title: Some(vec![title.to_string()]),
        }
    }

    #[test]
    fn exact_normalized_title_wins() {
        let items = vec![
            item("10.1000/other", "A different study"),
            item("10.1038/NG.1234", "Genome-wide association study of T2D."),
        ];
        assert_eq!(
            best_match("Genome-wide Association Study of T2D", &items).as_deref(),
            Some("10.1038/NG.1234")
        );
        assert_eq!(best_match("Unrelated", &items), None);
    }

    #[test]
    fn cache_keys_are_bounded_and_hint_sensitive() {
        let title = "A ".repeat(200);
        let key = cache_key(&title, None);
        assert!(key.len() <= SLUG_LIMIT + 17);
        assert_ne!(
            cache_key("Same title", Some("2020-01-01")),
            cache_key("Same title", Some("2021-01-01"))
        );
        assert!(cache_key("Same title", None).starts_with("same-title-"));
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(""), 0xcbf29ce484222325);
        assert_eq!(fnv1a("a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn year_hint_becomes_filter() {
        assert_eq!(hint_year("2019-03-01"), Some(2019));
        assert_eq!(hint_year("unknown"), None);
    }
}
