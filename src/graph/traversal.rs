//! Bounded breadth-first citation graph build.

use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::expander::{CitationExpander, Neighbors};
use super::fetcher::MetadataFetcher;
use super::index::NodeIndex;
use super::resolver::{IdentifierResolver, Resolution};
use crate::cache::PaperCache;
use crate::config::{Config, GraphConfig};
use crate::connectors::{ConnectorRegistry, HttpClient};
use crate::crossref::{CrossrefClient, DoiLookup};
use crate::error::{CitegraphError, Result, SourceError};
use crate::models::{CitationGraph, CitationLink, Direction, Paper};

/// Validated graph build parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub paper_ids: Vec<String>,
    /// 0 resolves the seeds only.
    pub depth: usize,
    pub max_citations: usize,
    pub direction: Direction,
}

impl GraphRequest {
    pub fn new(paper_ids: Vec<String>, depth: usize, max_citations: usize, direction: Direction) -> Result<Self> {
        let paper_ids: Vec<String> = paper_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if paper_ids.is_empty() {
            return Err(CitegraphError::InvalidInput(
                "at least one paper id is required".to_string(),
            ));
        }
        Ok(Self {
            paper_ids,
            depth,
            max_citations,
            direction,
        })
    }

    /// Validate loosely typed parameters as they arrive from tool calls.
    pub fn parse(paper_ids: &[String], depth: i64, max_citations: i64, direction: &str) -> Result<Self> {
        let depth = usize::try_from(depth)
            .map_err(|_| CitegraphError::InvalidInput(format!("depth must be >= 0, got {}", depth)))?;
        let max_citations = usize::try_from(max_citations).map_err(|_| {
            CitegraphError::InvalidInput(format!("max_citations must be >= 0, got {}", max_citations))
        })?;
        let direction: Direction = direction.parse()?;
        Self::new(paper_ids.to_vec(), depth, max_citations, direction)
    }
}

/// Per-build counters, logged when the build finishes.
#[derive(Debug, Default, Clone)]
pub struct BuildStats {
    pub levels: usize,
    pub fetched: usize,
    pub failed: Vec<String>,
    pub duplicate_edges: usize,
    pub cache_hits: usize,
}

/// Result of processing one frontier id.
struct NodeOutcome {
    requested: String,
    result: Result<(Paper, Neighbors)>,
}

/// Builds citation graphs over a connector registry and a DOI lookup.
///
/// Traversal state and the paper cache are created per build and dropped
/// with it; nothing is shared between builds.
pub struct CitationGraphBuilder {
    registry: ConnectorRegistry,
    doi_lookup: Arc<dyn DoiLookup>,
    concurrency: usize,
    timeout: Option<Duration>,
    cache_capacity: usize,
}

impl CitationGraphBuilder {
    pub fn new(registry: ConnectorRegistry, doi_lookup: Arc<dyn DoiLookup>) -> Self {
        let defaults = GraphConfig::default();
        Self {
            registry,
            doi_lookup,
            concurrency: defaults.concurrency,
            timeout: None,
            cache_capacity: defaults.cache_capacity,
        }
    }

    pub fn from_config(config: &Config, registry: ConnectorRegistry, doi_lookup: Arc<dyn DoiLookup>) -> Self {
        Self {
            registry,
            doi_lookup,
            concurrency: config.graph.concurrency,
            timeout: config.build_timeout(),
            cache_capacity: config.graph.cache_capacity,
        }
    }

    /// Wire the configured connectors and a Crossref client over one HTTP pool.
    pub fn connect(config: &Config) -> Result<Self> {
        let http = HttpClient::new(&config.http)
            .map_err(|e| CitegraphError::Config(format!("HTTP client: {}", e)))?;
        let registry = ConnectorRegistry::from_config(config, &http);
        let crossref = CrossrefClient::new(http, config.sources.crossref_mailto.clone());
        Ok(Self::from_config(config, registry, Arc::new(crossref)))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    pub fn doi_lookup(&self) -> &Arc<dyn DoiLookup> {
        &self.doi_lookup
    }

    /// Resolve and fetch one paper outside of any graph build.
    pub async fn fetch_paper_metadata(&self, paper_id: &str) -> Result<Paper> {
        let paper_id = paper_id.trim();
        if paper_id.is_empty() {
            return Err(CitegraphError::InvalidInput("paper_id must not be empty".to_string()));
        }
        let cache = PaperCache::new(1);
        let fetcher = MetadataFetcher::new(
            IdentifierResolver::new(&self.registry),
            self.doi_lookup.as_ref(),
            &cache,
            1,
        );
        fetcher.fetch(paper_id).await
    }

    /// Full text (PDF bytes) through the connector that owns `paper_id`.
    pub async fn download_full_text(&self, paper_id: &str) -> Result<Vec<u8>> {
        let resolution = IdentifierResolver::new(&self.registry).resolve(paper_id)?;
        match resolution {
            Resolution::Connector { connector, paper_id } => connector
                .download_full_text(&paper_id)
                .await
                .map_err(|reason| CitegraphError::SourceUnavailable {
                    source_name: connector.name().to_string(),
                    reason,
                }),
            Resolution::Doi(doi) => Err(CitegraphError::SourceUnavailable {
                source_name: "doi".to_string(),
                reason: SourceError::Unsupported(format!("no full-text source for doi:{}", doi)),
            }),
        }
    }

    /// Build the citation graph around `paper_ids`.
    ///
    /// Per-paper failures only shrink the graph. Errors are returned for
    /// malformed input, for a build that found nothing at all, and for
    /// timeouts.
    pub async fn build_citation_graph(
        &self,
        paper_ids: &[String],
        depth: i64,
        max_citations: i64,
        direction: &str,
    ) -> Result<CitationGraph> {
        let request = GraphRequest::parse(paper_ids, depth, max_citations, direction)?;
        self.build_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`build_citation_graph`](Self::build_citation_graph) but stops with
    /// `Cancelled` when `cancel` fires. Partial graphs are never returned.
    pub async fn build_with_cancel(&self, request: GraphRequest, cancel: CancellationToken) -> Result<CitationGraph> {
        let timeout = self.timeout;
        let build = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, self.run(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(CitegraphError::Timeout(limit)),
                },
                None => self.run(&request).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Citation graph build for {:?} cancelled", request.paper_ids);
                Err(CitegraphError::Cancelled)
            }
            result = build => result,
        }
    }

    async fn run(&self, request: &GraphRequest) -> Result<CitationGraph> {
        let started = Instant::now();
        let cache = PaperCache::new(self.cache_capacity);
        let fetcher = MetadataFetcher::new(
            IdentifierResolver::new(&self.registry),
            self.doi_lookup.as_ref(),
            &cache,
            self.concurrency,
        );
        let expander = CitationExpander::new(&self.registry, &fetcher, self.concurrency);

        log::info!(
            "Building citation graph: seeds={:?} depth={} max_citations={} direction={}",
            request.paper_ids,
            request.depth,
            request.max_citations,
            request.direction
        );

        let mut frontier: Vec<String> = Vec::new();
        for id in &request.paper_ids {
            if !frontier.contains(id) {
                frontier.push(id.clone());
            }
        }
        let mut visited: HashSet<String> = HashSet::new();
        let mut index = NodeIndex::new();
        let mut links: Vec<CitationLink> = Vec::new();
        let mut stats = BuildStats::default();

        for level in 0..=request.depth {
            if frontier.is_empty() {
                log::debug!("Frontier empty at level {}; stopping", level);
                break;
            }

            let batch: Vec<String> = std::mem::take(&mut frontier)
                .into_iter()
                .filter(|id| !is_visited(&visited, &index, id))
                .collect();
            let expand = level < request.depth;

            let outcomes: Vec<NodeOutcome> = stream::iter(batch)
                .map(|id| process(&fetcher, &expander, id, expand, request))
                .buffered(self.concurrency.max(1))
                .collect()
                .await;

            let mut level_failed = 0;
            for outcome in outcomes {
                let (paper, neighbors) = match outcome.result {
                    Ok(found) => found,
                    Err(e) => {
                        log::warn!("Skipping {}: {}", outcome.requested, e);
                        visited.insert(outcome.requested.clone());
                        stats.failed.push(outcome.requested);
                        level_failed += 1;
                        continue;
                    }
                };
                stats.fetched += 1;

                let fetched_id = paper.paper_id.clone();
                let this = index.insert(paper);
                index.alias(&outcome.requested, &this);
                visited.insert(outcome.requested);
                visited.insert(fetched_id);
                visited.insert(this.clone());

                for (kind, neighbor) in neighbors.into_sides() {
                    let neighbor_id = neighbor.paper_id.clone();
                    let target = index.insert(neighbor);

                    links.push(kind.link(&this, &target));

                    if !is_visited(&visited, &index, &neighbor_id) && !frontier.contains(&neighbor_id) {
                        frontier.push(neighbor_id);
                    }
                }
            }

            stats.levels += 1;
            log::info!(
                "Level {}: {} nodes, {} links, {} failed, {} queued",
                level,
                index.len(),
                links.len(),
                level_failed,
                frontier.len()
            );
        }

        let links = canonical_links(&index, links, &mut stats);
        stats.cache_hits = cache.hits();
        log::info!(
            "Citation graph built in {:?}: {} nodes, {} links, levels={} fetched={} failed={} duplicate_edges={} cache_hits={}",
            started.elapsed(),
            index.len(),
            links.len(),
            stats.levels,
            stats.fetched,
            stats.failed.len(),
            stats.duplicate_edges,
            stats.cache_hits
        );
        if !stats.failed.is_empty() {
            log::debug!("Failed ids: {:?}", stats.failed);
        }

        if index.is_empty() && links.is_empty() {
            return Err(CitegraphError::NoPapersFound(request.paper_ids.join(", ")));
        }

        Ok(CitationGraph {
            nodes: index.into_nodes(),
            links,
        })
    }
}

/// Rewrite endpoints to canonical node ids and drop duplicate edges.
///
/// A node's canonical id can change after an edge was recorded, when a
/// Crossref record is replaced by the connector record with the same DOI.
fn canonical_links(index: &NodeIndex, links: Vec<CitationLink>, stats: &mut BuildStats) -> Vec<CitationLink> {
    let mut seen: HashSet<CitationLink> = HashSet::new();
    let mut out = Vec::with_capacity(links.len());
    for link in links {
        let source = index.canonical(&link.source_id).unwrap_or(&link.source_id);
        let target = index.canonical(&link.target_id).unwrap_or(&link.target_id);
        let link = CitationLink::new(source, target);
        if seen.insert(link.clone()) {
            out.push(link);
        } else {
            stats.duplicate_edges += 1;
        }
    }
    out
}

/// Visited directly, or through the node it aliases.
fn is_visited(visited: &HashSet<String>, index: &NodeIndex, id: &str) -> bool {
    visited.contains(id) || index.canonical(id).is_some_and(|c| visited.contains(c))
}

async fn process(
    fetcher: &MetadataFetcher<'_>,
    expander: &CitationExpander<'_>,
    id: String,
    expand: bool,
    request: &GraphRequest,
) -> NodeOutcome {
    let result = match fetcher.fetch(&id).await {
        Ok(paper) => {
            let neighbors = if expand {
                expander
                    .expand(&paper, request.direction, request.max_citations)
                    .await
            } else {
                Neighbors::default()
            };
            Ok((paper, neighbors))
        }
        Err(e) => Err(e),
    };
    NodeOutcome { requested: id, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::{paper, paper_with_doi, work, MockConnector, MockDoiLookup};

    fn builder(connectors: Vec<MockConnector>, doi: MockDoiLookup) -> CitationGraphBuilder {
        let mut registry = ConnectorRegistry::new();
        for connector in connectors {
            registry.register(Arc::new(connector));
        }
        CitationGraphBuilder::new(registry, Arc::new(doi)).with_concurrency(4)
    }

    fn seeds(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn node_ids(graph: &CitationGraph) -> Vec<&str> {
        let mut ids: Vec<&str> = graph.nodes.iter().map(|p| p.paper_id.as_str()).collect();
        ids.sort();
        ids
    }

    fn link_pairs(graph: &CitationGraph) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = graph
            .links
            .iter()
            .map(|l| (l.source_id.as_str(), l.target_id.as_str()))
            .collect();
        pairs.sort();
        pairs
    }

    /// 1111 and 2222 both cite 3333; 3333 cites 4444; 5555 cites 1111.
    fn chain() -> MockConnector {
        MockConnector::new("arxiv")
            .with_paper(paper("arxiv:1111.1111", "One"))
            .with_paper(paper("arxiv:2222.2222", "Two"))
            .with_paper(paper("arxiv:3333.3333", "Three"))
            .with_paper(paper("arxiv:4444.4444", "Four"))
            .with_paper(paper("arxiv:5555.5555", "Five"))
            .with_cited("arxiv:1111.1111", &["arxiv:3333.3333"])
            .with_cited("arxiv:2222.2222", &["arxiv:3333.3333"])
            .with_cited("arxiv:3333.3333", &["arxiv:4444.4444"])
            .with_citing("arxiv:1111.1111", &["arxiv:5555.5555"])
    }

    #[tokio::test]
    async fn test_depth_zero_returns_only_the_seed() {
        let b = builder(vec![chain()], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(&seeds(&["arxiv:1111.1111"]), 0, 10, "both")
            .await
            .unwrap();
        assert_eq!(node_ids(&graph), vec!["arxiv:1111.1111"]);
        assert!(graph.links.is_empty());
    }

    #[tokio::test]
    async fn test_co_cited_paper_appears_once_with_two_edges() {
        let b = builder(vec![chain()], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(&seeds(&["arxiv:1111.1111", "arxiv:2222.2222"]), 1, 10, "cited")
            .await
            .unwrap();
        assert_eq!(
            node_ids(&graph),
            vec!["arxiv:1111.1111", "arxiv:2222.2222", "arxiv:3333.3333"]
        );
        assert_eq!(
            link_pairs(&graph),
            vec![
                ("arxiv:1111.1111", "arxiv:3333.3333"),
                ("arxiv:2222.2222", "arxiv:3333.3333"),
            ]
        );
    }

    #[tokio::test]
    async fn test_both_directions_orient_edges() {
        let b = builder(vec![chain()], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(&seeds(&["arxiv:1111.1111"]), 1, 10, "both")
            .await
            .unwrap();
        assert_eq!(
            link_pairs(&graph),
            vec![
                ("arxiv:1111.1111", "arxiv:3333.3333"),
                ("arxiv:5555.5555", "arxiv:1111.1111"),
            ]
        );
    }

    #[tokio::test]
    async fn test_doi_fallback_seed() {
        let b = builder(
            vec![MockConnector::new("arxiv")],
            MockDoiLookup::new().with_work(work("10.1/xyz", "T")),
        );
        let graph = b
            .build_citation_graph(&seeds(&["doi:10.1/xyz"]), 0, 10, "both")
            .await
            .unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].title, "T");
        assert_eq!(graph.nodes[0].source, "crossref");
    }

    #[tokio::test]
    async fn test_max_citations_limits_neighbors() {
        let many = ["arxiv:a", "arxiv:b", "arxiv:c", "arxiv:d", "arxiv:e"];
        let mut arxiv = MockConnector::new("arxiv")
            .with_paper(paper("arxiv:seed", "Seed"))
            .with_cited("arxiv:seed", &many);
        for id in many {
            arxiv = arxiv.with_paper(paper(id, id));
        }
        let b = builder(vec![arxiv], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(&seeds(&["arxiv:seed"]), 1, 2, "cited")
            .await
            .unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.links.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_seed_does_not_empty_the_graph() {
        let b = builder(vec![chain().failing("arxiv:2222.2222")], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(
                &seeds(&["arxiv:2222.2222", "openalex:W1", "arxiv:1111.1111"]),
                1,
                10,
                "cited",
            )
            .await
            .unwrap();
        assert_eq!(node_ids(&graph), vec!["arxiv:1111.1111", "arxiv:3333.3333"]);
        assert_eq!(link_pairs(&graph), vec![("arxiv:1111.1111", "arxiv:3333.3333")]);
    }

    #[tokio::test]
    async fn test_all_seeds_failing_is_an_error() {
        let b = builder(vec![chain()], MockDoiLookup::new());
        let err = b
            .build_citation_graph(&seeds(&["openalex:W1", "arxiv:0000.0000"]), 2, 10, "both")
            .await
            .unwrap_err();
        assert!(matches!(err, CitegraphError::NoPapersFound(_)));
    }

    #[tokio::test]
    async fn test_expanded_neighbors_are_nodes() {
        let b = builder(vec![chain()], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(&seeds(&["arxiv:3333.3333"]), 2, 10, "cited")
            .await
            .unwrap();
        assert!(graph.dangling_ids().is_empty());
        assert_eq!(link_pairs(&graph), vec![("arxiv:3333.3333", "arxiv:4444.4444")]);
    }

    #[tokio::test]
    async fn test_depth_growth_is_monotonic() {
        let mut previous: Vec<String> = Vec::new();
        for depth in 0..4 {
            let b = builder(vec![chain()], MockDoiLookup::new());
            let graph = b
                .build_citation_graph(&seeds(&["arxiv:1111.1111"]), depth, 10, "both")
                .await
                .unwrap();
            let ids: Vec<String> = node_ids(&graph).into_iter().map(String::from).collect();
            for id in &previous {
                assert!(ids.contains(id), "depth {} lost {}", depth, id);
            }
            previous = ids;
        }
        assert_eq!(previous.len(), 4);
    }

    #[tokio::test]
    async fn test_cited_links_start_at_processed_nodes() {
        let b = builder(vec![chain()], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(&seeds(&["arxiv:1111.1111", "arxiv:2222.2222"]), 3, 10, "cited")
            .await
            .unwrap();
        for link in &graph.links {
            assert!(graph.node(&link.source_id).is_some(), "{:?}", link);
        }
        assert!(link_pairs(&graph).contains(&("arxiv:3333.3333", "arxiv:4444.4444")));
    }

    #[tokio::test]
    async fn test_cycles_terminate() {
        let arxiv = MockConnector::new("arxiv")
            .with_paper(paper("arxiv:a", "A"))
            .with_paper(paper("arxiv:b", "B"))
            .with_cited("arxiv:a", &["arxiv:b"])
            .with_cited("arxiv:b", &["arxiv:a"]);
        let b = builder(vec![arxiv], MockDoiLookup::new());
        let graph = b
            .build_citation_graph(&seeds(&["arxiv:a"]), 10, 10, "cited")
            .await
            .unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(link_pairs(&graph), vec![("arxiv:a", "arxiv:b"), ("arxiv:b", "arxiv:a")]);
    }

    #[tokio::test]
    async fn test_doi_alias_merges_namespaces() {
        let arxiv = MockConnector::new("arxiv")
            .without_native_lists()
            .with_paper(paper_with_doi("arxiv:seed", "Seed", "10.1/seed"))
            .with_paper(paper_with_doi("arxiv:ref", "Ref", "10.1/ref"));
        let doi = MockDoiLookup::new()
            .with_work(work("10.1/seed", "Seed"))
            .with_work(work("10.1/ref", "Ref"))
            .with_work(work("10.1/other", "Other"))
            .with_referenced("10.1/seed", &["10.1/ref"])
            .with_citing("10.1/seed", &["10.1/other"]);
        let b = builder(vec![arxiv], doi);

        let graph = b
            .build_citation_graph(&seeds(&["arxiv:seed", "arxiv:ref"]), 1, 10, "both")
            .await
            .unwrap();
        // doi:10.1/ref is the same paper as arxiv:ref
        assert_eq!(node_ids(&graph), vec!["arxiv:ref", "arxiv:seed", "doi:10.1/other"]);
        assert!(link_pairs(&graph).contains(&("arxiv:seed", "arxiv:ref")));
        assert!(link_pairs(&graph).contains(&("doi:10.1/other", "arxiv:seed")));
    }

    #[tokio::test]
    async fn test_fetch_paper_metadata() {
        let b = builder(vec![chain()], MockDoiLookup::new().with_work(work("10.1/xyz", "T")));
        assert_eq!(b.fetch_paper_metadata("arxiv:3333.3333").await.unwrap().title, "Three");
        assert_eq!(b.fetch_paper_metadata(" doi:10.1/xyz ").await.unwrap().title, "T");
        assert!(matches!(
            b.fetch_paper_metadata("").await.unwrap_err(),
            CitegraphError::InvalidInput(_)
        ));
        assert!(matches!(
            b.download_full_text("doi:10.1/xyz").await.unwrap_err(),
            CitegraphError::SourceUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let b = builder(vec![chain()], MockDoiLookup::new());
        for (ids, depth, max, direction) in [
            (seeds(&[]), 1, 10, "both"),
            (seeds(&["  "]), 1, 10, "both"),
            (seeds(&["arxiv:1111.1111"]), -1, 10, "both"),
            (seeds(&["arxiv:1111.1111"]), 1, -5, "both"),
            (seeds(&["arxiv:1111.1111"]), 1, 10, "sideways"),
        ] {
            let err = b.build_citation_graph(&ids, depth, max, direction).await.unwrap_err();
            assert!(matches!(err, CitegraphError::InvalidInput(_)), "{:?}", err);
        }
    }

    #[tokio::test]
    async fn test_cancellation_is_explicit() {
        let slow = chain().with_delay(Duration::from_secs(5));
        let b = builder(vec![slow], MockDoiLookup::new());
        let request = GraphRequest::parse(&seeds(&["arxiv:1111.1111"]), 2, 10, "both").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = b.build_with_cancel(request, cancel).await.unwrap_err();
        assert!(matches!(err, CitegraphError::Cancelled));
    }

    #[tokio::test]
    async fn test_timeout_is_explicit() {
        let slow = chain().with_delay(Duration::from_secs(5));
        let b = builder(vec![slow], MockDoiLookup::new()).with_timeout(Some(Duration::from_millis(20)));
        let err = b
            .build_citation_graph(&seeds(&["arxiv:1111.1111"]), 1, 10, "both")
            .await
            .unwrap_err();
        assert!(matches!(err, CitegraphError::Timeout(limit) if limit == Duration::from_millis(20)));
        assert_eq!(err.to_string(), "Citation graph build timed out after 20ms");
    }
}
