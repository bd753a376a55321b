use camino::Utf8Path;

use crate::error::CrawlError;
use crate::http::HttpGet;
use crate::store::Store;

/// Where a fetched body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    pub origin: Origin,
}

/// HTTP GET in front of a file cache. A cached file is returned as-is when
/// `use_cache` is set; otherwise the body is fetched and written before it is
/// returned. Non-2xx responses become `PortalStatus` and nothing is cached.
/// No retries here.
pub struct CachedFetcher<H: HttpGet> {
    http: H,
}

impl<H: HttpGet> CachedFetcher<H> {
    pub fn new(http: H) -> Self {
        Self { http }
    }

    pub fn fetch(&self, url: &str, cache_path: &Utf8Path, use_cache: bool) -> Result<String, CrawlError> {
        self.fetch_traced(url, cache_path, use_cache)
            .map(|fetched| fetched.body)
    }

    pub fn fetch_traced(
        &self,
        url: &str,
        cache_path: &Utf8Path,
        use_cache: bool,
    ) -> Result<Fetched, CrawlError> {
        if use_cache {
            if let Some(body) = Store::read_cached(cache_path)? {
                tracing::debug!(url, path = %cache_path, "cache hit");
                return Ok(Fetched {
                    body,
                    origin: Origin::Cache,
                });
            }
        }

        let response = self.http.get(url).map_err(|message| CrawlError::PortalHttp {
            url: url.to_string(),
            message,
        })?;
        if !response.is_success() {
            return Err(CrawlError::PortalStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        Store::write_bytes_atomic(cache_path, response.body.as_bytes())?;
        tracing::debug!(url, path = %cache_path, "fetched");
        Ok(Fetched {
            body: response.body,
            origin: Origin::Network,
        })
    }
}
