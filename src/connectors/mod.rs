//! Scholarly source connectors.
//!
//! Every source implements [`Connector`]; the [`ConnectorRegistry`] keeps them
//! in a fixed registration order so identifier probing is reproducible.

pub mod arxiv;
pub mod google_scholar;
pub mod http;
pub mod pubmed;
pub mod semantic_scholar;
mod xml;

pub use arxiv::ArxivConnector;
pub use google_scholar::GoogleScholarConnector;
pub use http::HttpClient;
pub use pubmed::PubMedConnector;
pub use semantic_scholar::SemanticScholarConnector;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::SourceError;
use crate::models::{CitationKind, Paper, SearchQuery};

/// Capability contract of a scholarly source adapter.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Registry name and PaperID namespace (e.g. `arxiv`).
    fn name(&self) -> &str;

    /// Free-text search bounded by `query.max_results`, ordered per `query.sort_by`.
    /// Fails as a whole; never returns a partial list.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError>;

    /// Fetch one paper by native or prefixed id.
    async fn get_metadata(&self, paper_id: &str) -> Result<Paper, SourceError>;

    /// Download the paper's full text (PDF bytes).
    async fn download_full_text(&self, paper_id: &str) -> Result<Vec<u8>, SourceError>;

    /// Normalize an external id or URL into this source's PaperID.
    ///
    /// Pure and idempotent. Input this source does not recognize is returned
    /// unchanged, which is how the resolver tells whether a source claims it.
    fn parse_id(&self, external_id: &str) -> String;

    /// Citation ids this source already returned inside `paper.raw_metadata`.
    ///
    /// `None` means the source has no native list for `kind`; `Some(vec![])`
    /// means it has one and it is empty.
    fn native_citations(&self, _paper: &Paper, _kind: CitationKind) -> Option<Vec<String>> {
        None
    }
}

/// Ordered collection of connectors keyed by name.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    entries: Vec<Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector. Re-registering a name replaces it in place.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|c| c.name() == connector.name())
        {
            *slot = connector;
        } else {
            self.entries.push(connector);
        }
    }

    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.register(connector);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Connector>> {
        self.entries.iter().find(|c| c.name() == name)
    }

    /// Connectors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Connector>> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the registry for the sources enabled in `config`, sharing one HTTP pool.
    pub fn from_config(config: &Config, http: &HttpClient) -> Self {
        let mut registry = Self::new();
        for source in &config.sources.enabled {
            match source.as_str() {
                "arxiv" => registry.register(Arc::new(ArxivConnector::new(http.clone()))),
                "pubmed" => registry.register(Arc::new(PubMedConnector::new(
                    http.clone(),
                    config.sources.pubmed_email.clone(),
                    config.sources.pubmed_tool.clone(),
                ))),
                "semanticscholar" => registry.register(Arc::new(SemanticScholarConnector::new(
                    http.clone(),
                    config.semanticscholar_api_key(),
                ))),
                "googlescholar" => {
                    if config.sources.google_scholar_enabled {
                        registry.register(Arc::new(GoogleScholarConnector::new(http.clone())));
                    } else {
                        log::debug!("googlescholar listed but sources.google_scholar_enabled = false; skipping");
                    }
                }
                other => log::warn!("Ignoring unknown source '{}'", other),
            }
        }
        log::info!("Registered connectors: {:?}", registry.names());
        registry
    }
}
