//! Clients for the external registries records are enriched from. Every
//! client answers with a [`Lookup`] and keeps the same on-disk cache shape.

pub mod archive;
pub mod cache;
pub mod doi;

use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::CrawlError;

pub use archive::{ArchiveClient, ArchiveKind, Archives, DEFAULT_REGISTRY_BASE, DatasetLookup};
pub use cache::{CacheEntry, ExternalCache};
pub use doi::{CrossrefClient, DEFAULT_CROSSREF_BASE, DoiQuery, DoiSearch};

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(1000);

/// Where a lookup was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Network,
    /// The key routes to no endpoint; nothing was asked.
    Unroutable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub metadata: Option<Value>,
    pub source: Source,
}

impl Lookup {
    pub fn unroutable() -> Self {
        Self {
            metadata: None,
            source: Source::Unroutable,
        }
    }
}

/// Fixed pause between requests that actually reached a registry.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    delay: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_DELAY)
    }
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn after(&self, result: &Result<Lookup, CrawlError>) {
        if reached_network(result) && !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

/// Cache hits, unroutable keys and local failures cost the registry nothing.
pub fn reached_network(result: &Result<Lookup, CrawlError>) -> bool {
    match result {
        Ok(lookup) => lookup.source == Source::Network,
        Err(CrawlError::Filesystem(_)) => false,
        Err(_) => true,
    }
}

/// Runs `get` over `keys` in order, pausing after each network round trip.
pub fn run_batch<F>(keys: &[String], throttle: Throttle, mut get: F) -> Vec<Result<Lookup, CrawlError>>
where
    F: FnMut(&str) -> Result<Lookup, CrawlError>,
{
    let mut results = Vec::with_capacity(keys.len());
    for (idx, key) in keys.iter().enumerate() {
        let result = get(key);
        if idx + 1 < keys.len() {
            throttle.after(&result);
        }
        results.push(result);
    }
    results
}
