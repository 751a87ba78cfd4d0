//! Metadata fetcher: one `Paper` per resolved id, through the per-build cache.

use tokio::sync::{Semaphore, SemaphorePermit};

use super::resolver::{IdentifierResolver, Resolution};
use crate::cache::PaperCache;
use crate::crossref::{work_to_paper, DoiLookup};
use crate::error::{CitegraphError, Result};
use crate::models::Paper;

/// Fetches papers for one graph build.
///
/// The semaphore bounds in-flight upstream calls across every concurrent
/// lookup of the build, including the expander's neighbor fetches.
pub struct MetadataFetcher<'a> {
    resolver: IdentifierResolver<'a>,
    doi_lookup: &'a dyn DoiLookup,
    cache: &'a PaperCache,
    limiter: Semaphore,
}

impl<'a> MetadataFetcher<'a> {
    pub fn new(
        resolver: IdentifierResolver<'a>,
        doi_lookup: &'a dyn DoiLookup,
        cache: &'a PaperCache,
        concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            doi_lookup,
            cache,
            limiter: Semaphore::new(concurrency.max(1)),
        }
    }

    pub fn resolver(&self) -> &IdentifierResolver<'a> {
        &self.resolver
    }

    pub fn cache(&self) -> &PaperCache {
        self.cache
    }

    pub fn doi_lookup(&self) -> &dyn DoiLookup {
        self.doi_lookup
    }

    /// Wait for an upstream slot. The semaphore is never closed.
    pub(crate) async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        self.limiter.acquire().await.ok()
    }

    /// Resolve then fetch.
    pub async fn fetch(&self, id: &str) -> Result<Paper> {
        if let Some(paper) = self.cache.get(id) {
            return Ok(paper);
        }
        let resolution = self.resolver.resolve(id)?;
        self.fetch_resolved(&resolution).await
    }

    pub async fn fetch_resolved(&self, resolution: &Resolution) -> Result<Paper> {
        let paper_id = resolution.paper_id();
        if let Some(paper) = self.cache.get(&paper_id) {
            log::debug!("Cache hit for {}", paper_id);
            return Ok(paper);
        }

        let fetched = {
            let _permit = self.permit().await;
            match resolution {
                Resolution::Connector { connector, paper_id } => connector.get_metadata(paper_id).await,
                Resolution::Doi(doi) => match self.doi_lookup.lookup_by_doi(doi).await {
                    Ok(work) => work_to_paper(&work),
                    Err(e) => Err(e),
                },
            }
        };

        match fetched {
            Ok(paper) => {
                log::debug!("Fetched {} from {}", paper.paper_id, resolution.source_name());
                self.cache.put(paper_id.clone(), paper.clone());
                self.cache.insert(&paper);
                Ok(paper)
            }
            Err(reason) => {
                if reason.is_not_found() {
                    log::debug!("{} not found upstream", paper_id);
                } else {
                    log::warn!("Fetching {} from {} failed: {}", paper_id, resolution.source_name(), reason);
                }
                Err(CitegraphError::MetadataUnavailable { id: paper_id, reason })
            }
        }
    }

    /// Cache a paper that arrived as a by-product (e.g. a converted citing work).
    pub fn remember(&self, paper: &Paper) {
        self.cache.insert(paper);
    }
}

/// Convenience for callers that only care whether the miss was expected.
pub fn is_expected_miss(err: &CitegraphError) -> bool {
    match err {
        CitegraphError::UnresolvedIdentifier(_) => true,
        CitegraphError::MetadataUnavailable { reason, .. } => reason.is_not_found(),
        _ => false,
    }
}
