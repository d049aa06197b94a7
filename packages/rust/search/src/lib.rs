//! Web search providers.
//!
//! This crate provides:
//! - [`SearchProvider`]: the seam the classifier talks to
//! - [`SerpApiClient`]: paced, time-boxed SerpAPI transport

pub mod serpapi;

use async_trait::async_trait;
use orgscan_shared::{Result, SearchItem};

pub use serpapi::{SerpApiClient, SerpApiOptions};

/// Parameters for one search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchRequest<'a> {
    /// Boolean query expression.
    pub query: &'a str,
    /// Number of items wanted.
    pub num: u32,
    /// Interface language, e.g. `en`.
    pub locale: Option<&'a str>,
    /// Provider-specific age filter, e.g. `qdr:y8`.
    pub time_window: Option<&'a str>,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a str, num: u32) -> Self {
        Self {
            query,
            num,
            locale: None,
            time_window: None,
        }
    }
}

/// An external search engine.
///
/// One call issues exactly one request. Implementations report
/// `OrgScanError::Auth` for missing/rejected credentials and
/// `OrgScanError::Provider` for everything else that goes wrong; an empty
/// result list is not an error. Retrying is the caller's decision.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Run one query and return the items in provider rank order.
    async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<SearchItem>>;
}
