//! Multi-source paper search.

use futures_util::future::join_all;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::connectors::{Connector, ConnectorRegistry};
use crate::error::{CitegraphError, Result};
use crate::models::{Paper, SearchQuery, SearchResult, SortBy, SourceOutcome, SourceStatus};

/// Search every requested source concurrently and merge the hits.
///
/// A source that fails contributes nothing; its error is reported in
/// `SearchResult::sources`. Results are ordered per `query.sort_by`:
///
/// - `relevance`: each source's own order, sources in the order requested
/// - `date`: newest first, undated papers last
/// - `citations`: highest count first, missing counts as 0
///
/// `total_found` counts merged hits before truncation to `max_results`.
///
/// # Errors
///
/// `InvalidInput` for an empty query, or when none of the requested sources
/// is registered.
pub async fn search_papers(registry: &ConnectorRegistry, query: &SearchQuery) -> Result<SearchResult> {
    if query.query.trim().is_empty() {
        return Err(CitegraphError::InvalidInput("query must not be empty".to_string()));
    }

    let requested: Vec<(&str, Option<&Arc<dyn Connector>>)> = query
        .sources
        .iter()
        .map(|source| (source.as_str(), registry.get(source)))
        .collect();
    if requested.iter().all(|(_, connector)| connector.is_none()) {
        return Err(CitegraphError::InvalidInput(format!(
            "none of the requested sources {:?} is available (registered: {:?})",
            query.sources,
            registry.names()
        )));
    }

    let searches = requested.iter().map(|(source, connector)| async move {
        let result = match connector {
            Some(connector) => Some(connector.search(query).await),
            None => None,
        };
        (*source, result)
    });

    let mut papers: Vec<Paper> = Vec::new();
    let mut outcomes = Vec::with_capacity(requested.len());
    for (source, result) in join_all(searches).await {
        let outcome = match result {
            Some(Ok(hits)) => {
                log::debug!("{} returned {} papers for '{}'", source, hits.len(), query.query);
                let count = hits.len();
                papers.extend(hits);
                SourceOutcome {
                    source: source.to_string(),
                    status: SourceStatus::Success,
                    count,
                    error: None,
                }
            }
            Some(Err(e)) => {
                log::warn!("Error searching {}: {}", source, e);
                SourceOutcome {
                    source: source.to_string(),
                    status: SourceStatus::Error,
                    count: 0,
                    error: Some(e.to_string()),
                }
            }
            None => {
                log::warn!("Source '{}' is not registered; skipping", source);
                SourceOutcome {
                    source: source.to_string(),
                    status: SourceStatus::Unavailable,
                    count: 0,
                    error: Some(format!("not registered (registered: {})", registry.names().join(", "))),
                }
            }
        };
        outcomes.push(outcome);
    }

    sort_papers(&mut papers, query.sort_by);
    let total_found = papers.len();
    papers.truncate(query.max_results);

    Ok(SearchResult {
        query: query.query.clone(),
        papers,
        total_found,
        sources: outcomes,
    })
}

/// Stable sort, so ties keep source order.
pub fn sort_papers(papers: &mut [Paper], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance => {}
        SortBy::Date => papers.sort_by(|a, b| match (a.publication_date, b.publication_date) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        SortBy::Citations => papers.sort_by(|a, b| {
            b.citations_count
                .unwrap_or(0)
                .cmp(&a.citations_count.unwrap_or(0))
        }),
    }
}
