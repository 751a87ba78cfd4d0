//! Citation expansion: the citing and cited neighbors of one paper.

use futures_util::stream::{self, StreamExt};

use super::fetcher::MetadataFetcher;
use crate::connectors::ConnectorRegistry;
use crate::crossref::work_to_paper;
use crate::error::{CitegraphError, Result};
use crate::models::{prefixed, CitationKind, Direction, Paper, CROSSREF_SOURCE};

/// Neighbors found for one paper, per side.
#[derive(Debug, Default, Clone)]
pub struct Neighbors {
    /// Papers citing the expanded paper.
    pub citing: Vec<Paper>,
    /// Papers the expanded paper cites.
    pub cited: Vec<Paper>,
}

impl Neighbors {
    pub fn is_empty(&self) -> bool {
        self.citing.is_empty() && self.cited.is_empty()
    }

    pub fn len(&self) -> usize {
        self.citing.len() + self.cited.len()
    }

    /// Both sides tagged with their kind, citing first.
    pub fn into_sides(self) -> impl Iterator<Item = (CitationKind, Paper)> {
        self.citing
            .into_iter()
            .map(|p| (CitationKind::Citing, p))
            .chain(self.cited.into_iter().map(|p| (CitationKind::Cited, p)))
    }
}

/// How one side of a paper is expanded.
#[derive(Debug, Clone, PartialEq)]
enum Strategy {
    /// Ids the paper's own source returned with its metadata.
    Native(Vec<String>),
    /// DOI-indexed lookups.
    Doi(String),
    /// Nothing to expand from.
    None,
}

pub struct CitationExpander<'a> {
    registry: &'a ConnectorRegistry,
    fetcher: &'a MetadataFetcher<'a>,
    concurrency: usize,
}

impl<'a> CitationExpander<'a> {
    pub fn new(registry: &'a ConnectorRegistry, fetcher: &'a MetadataFetcher<'a>, concurrency: usize) -> Self {
        Self {
            registry,
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Expand `paper` in `direction`, at most `max_citations` per side.
    ///
    /// A failing side contributes no neighbors; it never fails the expansion.
    pub async fn expand(&self, paper: &Paper, direction: Direction, max_citations: usize) -> Neighbors {
        let mut neighbors = Neighbors::default();
        if max_citations == 0 {
            return neighbors;
        }
        if direction.includes_citing() {
            neighbors.citing = self.side_or_empty(paper, CitationKind::Citing, max_citations).await;
        }
        if direction.includes_cited() {
            neighbors.cited = self.side_or_empty(paper, CitationKind::Cited, max_citations).await;
        }
        neighbors
    }

    async fn side_or_empty(&self, paper: &Paper, kind: CitationKind, max: usize) -> Vec<Paper> {
        match self.side(paper, kind, max).await {
            Ok(papers) => papers,
            Err(e) => {
                log::warn!("Expanding {:?} of {} failed: {}", kind, paper.paper_id, e);
                Vec::new()
            }
        }
    }

    fn strategy(&self, paper: &Paper, kind: CitationKind) -> Strategy {
        let native = self
            .registry
            .get(&paper.source)
            .and_then(|connector| connector.native_citations(paper, kind));
        if let Some(ids) = native {
            return Strategy::Native(ids);
        }
        match paper.doi_key() {
            Some(doi) => Strategy::Doi(doi),
            None => Strategy::None,
        }
    }

    /// One side, or `SourceUnavailable` if the upstream call failed outright.
    pub async fn side(&self, paper: &Paper, kind: CitationKind, max: usize) -> Result<Vec<Paper>> {
        match self.strategy(paper, kind) {
            Strategy::Native(mut ids) => {
                ids.truncate(max);
                Ok(self.fetch_all(ids).await)
            }
            Strategy::Doi(doi) => self.doi_side(&doi, kind, max).await,
            Strategy::None => {
                log::debug!("{} has no citation source; not expanding", paper.paper_id);
                Ok(Vec::new())
            }
        }
    }

    /// Resolve and fetch every id, dropping the ones that fail.
    async fn fetch_all(&self, ids: Vec<String>) -> Vec<Paper> {
        let results: Vec<(String, Result<Paper>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.fetcher.fetch(&id).await;
                (id, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(paper) => Some(paper),
                Err(e) => {
                    log::debug!("Dropping neighbor {}: {}", id, e);
                    None
                }
            })
            .collect()
    }

    async fn doi_side(&self, doi: &str, kind: CitationKind, max: usize) -> Result<Vec<Paper>> {
        let unavailable = |reason| CitegraphError::SourceUnavailable {
            source_name: CROSSREF_SOURCE.to_string(),
            reason,
        };
        let lookup = self.fetcher.doi_lookup();

        if kind == CitationKind::Cited {
            // Each reference is fetched on its own permit.
            let dois = {
                let _permit = self.fetcher.permit().await;
                lookup.reference_dois(doi, max).await
            }
            .map_err(unavailable)?;
            let ids = dois.iter().map(|d| prefixed("doi", d)).collect();
            return Ok(self.fetch_all(ids).await);
        }

        let works = {
            let _permit = self.fetcher.permit().await;
            lookup.find_citing_works(doi, max).await
        }
        .map_err(unavailable)?;

        let mut papers: Vec<Paper> = works
            .iter()
            .filter_map(|work| match work_to_paper(work) {
                Ok(paper) => Some(paper),
                Err(e) => {
                    log::debug!("Dropping Crossref work near {}: {}", doi, e);
                    None
                }
            })
            .collect();
        papers.truncate(max);
        for paper in &papers {
            self.fetcher.remember(paper);
        }
        Ok(papers)
    }
}
