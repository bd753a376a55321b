use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{HumVersionId, Lang};

pub const DEFAULT_PORTAL_BASE: &str = "https://humandbs.dbcls.jp";

static DETAIL_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:/en)?/(hum\d{4}-v\d+)/?$").expect("valid detail path pattern")
});

/// URL templates of the portal.
#[derive(Debug, Clone)]
pub struct Portal {
    base_url: String,
}

impl Default for Portal {
    fn default() -> Self {
        Self::new(DEFAULT_PORTAL_BASE)
    }
}

impl Portal {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lang_prefix(&self, lang: Lang) -> String {
        match lang {
            Lang::Ja => self.base_url.clone(),
            Lang::En => format!("{}/en", self.base_url),
        }
    }

    pub fn home_url(&self, lang: Lang) -> String {
        format!("{}/", self.lang_prefix(lang))
    }

    pub fn detail_url(&self, id: &HumVersionId, lang: Lang) -> String {
        format!("{}/{id}", self.lang_prefix(lang))
    }

    pub fn release_url(&self, id: &HumVersionId, lang: Lang) -> String {
        format!("{}/{id}-release", self.lang_prefix(lang))
    }

    /// Recovers the humVersionId from a detail-page link, absolute or
    /// relative, in either language. Anything else is `None`.
    pub fn parse_detail_href(&self, href: &str) -> Option<HumVersionId> {
        let href = href.trim();
        let path = match href.strip_prefix(&self.base_url) {
            Some(rest) => rest,
            None if href.contains("://") => return None,
            None => href,
        };
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let caps = DETAIL_PATH_RE.captures(path)?;
        caps.get(1)?.as_str().parse().ok()
    }
}
