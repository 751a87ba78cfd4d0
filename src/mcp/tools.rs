use crate::config::GraphConfig;
use crate::error::{CitegraphError, Result};
use crate::graph::CitationGraphBuilder;
use crate::mcp::types::{Tool, ToolsCallResult};
use crate::models::{CitationGraph, Paper, SearchQuery, SortBy};
use crate::search::search_papers;
use serde::Deserialize;
use serde_json::{json, Value};

/// Get all tool definitions for tools/list
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "search_papers".to_string(),
            description: "Search academic papers across arXiv, PubMed, Semantic Scholar and (when enabled) Google Scholar".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Free-text search query"
                    },
                    "sources": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Sources to search, e.g. [\"arxiv\", \"pubmed\", \"semanticscholar\"]. Defaults to arxiv, pubmed and semanticscholar."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of merged results",
                        "default": 20,
                        "minimum": 1
                    },
                    "sort_by": {
                        "type": "string",
                        "enum": ["relevance", "date", "citations"],
                        "default": "relevance"
                    }
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "fetch_paper_metadata".to_string(),
            description: "Fetch the metadata of one paper by identifier (arxiv:, pubmed:, semanticscholar:, googlescholar:, doi:, or a recognizable URL)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "paper_id": {
                        "type": "string",
                        "description": "Paper identifier"
                    }
                },
                "required": ["paper_id"]
            }),
        },
        Tool {
            name: "get_citation_graph".to_string(),
            description: "Build a citation graph around seed papers by breadth-first expansion of citing and cited works".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "paper_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Seed paper identifiers",
                        "minItems": 1
                    },
                    "depth": {
                        "type": "integer",
                        "description": "Expansion levels; 0 returns the seeds only",
                        "minimum": 0
                    },
                    "max_citations": {
                        "type": "integer",
                        "description": "Maximum neighbors per side for each expanded paper",
                        "minimum": 0
                    },
                    "direction": {
                        "type": "string",
                        "enum": ["both", "citing", "cited"]
                    }
                },
                "required": ["paper_ids"]
            }),
        },
    ]
}

/// Tool failures are reported in-band so the client sees the reason.
fn tool_error(context: &str, err: CitegraphError) -> ToolsCallResult {
    log::warn!("{} failed: {}", context, err);
    ToolsCallResult::error(format!("Error: {}", err))
}

fn invalid_arguments(tool: &str, err: serde_json::Error) -> ToolsCallResult {
    ToolsCallResult::error(format!("Error: invalid arguments for {}: {}", tool, err))
}

fn pretty(value: &Value) -> Result<ToolsCallResult> {
    Ok(ToolsCallResult::text(serde_json::to_string_pretty(value)?))
}

/// Search parameters
#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    sources: Option<Vec<String>>,
    max_results: Option<i64>,
    sort_by: Option<String>,
}

fn search_query(params: SearchParams) -> Result<SearchQuery> {
    let mut query = SearchQuery::new(params.query);
    if let Some(sources) = params.sources {
        query.sources = sources.into_iter().map(|s| s.trim().to_lowercase()).collect();
    }
    if let Some(max) = params.max_results {
        if max < 1 {
            return Err(CitegraphError::InvalidInput(format!(
                "max_results must be >= 1, got {}",
                max
            )));
        }
        query.max_results = max as usize;
    }
    if let Some(sort_by) = params.sort_by {
        query.sort_by = sort_by.parse::<SortBy>()?;
    }
    Ok(query)
}

fn paper_summary(paper: &Paper) -> Value {
    json!({
        "id": paper.paper_id,
        "title": paper.title,
        "authors": paper.author_names(),
        "year": paper.year(),
        "journal": paper.journal,
        "doi": paper.doi,
        "url": paper.url,
        "pdf_url": paper.pdf_url,
        "citations_count": paper.citations_count,
        "source": paper.source,
    })
}

/// Handle search_papers tool
pub async fn handle_search(builder: &CitationGraphBuilder, arguments: &Value) -> Result<ToolsCallResult> {
    let params: SearchParams = match serde_json::from_value(arguments.clone()) {
        Ok(params) => params,
        Err(e) => return Ok(invalid_arguments("search_papers", e)),
    };

    let query = match search_query(params) {
        Ok(query) => query,
        Err(e) => return Ok(tool_error("search_papers", e)),
    };

    let result = match search_papers(builder.registry(), &query).await {
        Ok(result) => result,
        Err(e) => return Ok(tool_error("search_papers", e)),
    };

    pretty(&json!({
        "query": result.query,
        "total_found": result.total_found,
        "sources": result.sources,
        "papers": result.papers.iter().map(paper_summary).collect::<Vec<_>>(),
    }))
}

/// Fetch parameters
#[derive(Debug, Deserialize)]
struct FetchParams {
    paper_id: String,
}

/// Handle fetch_paper_metadata tool
pub async fn handle_fetch(builder: &CitationGraphBuilder, arguments: &Value) -> Result<ToolsCallResult> {
    let params: FetchParams = match serde_json::from_value(arguments.clone()) {
        Ok(params) => params,
        Err(e) => return Ok(invalid_arguments("fetch_paper_metadata", e)),
    };

    match builder.fetch_paper_metadata(&params.paper_id).await {
        Ok(paper) => pretty(&serde_json::to_value(&paper)?),
        Err(e) => Ok(tool_error("fetch_paper_metadata", e)),
    }
}

/// Graph parameters; omitted values come from `[graph]` config.
#[derive(Debug, Deserialize)]
struct GraphParams {
    paper_ids: Vec<String>,
    depth: Option<i64>,
    max_citations: Option<i64>,
    direction: Option<String>,
}

/// Wire shape of a citation graph: nodes carry display fields, links carry ids.
pub fn graph_to_json(graph: &CitationGraph) -> Value {
    json!({
        "nodes": graph.nodes.iter().map(|p| json!({
            "id": p.paper_id,
            "title": p.title,
            "authors": p.author_names(),
            "journal": p.journal,
            "year": p.year(),
            "source": p.source,
        })).collect::<Vec<_>>(),
        "links": graph.links.iter().map(|l| json!({
            "source": l.source_id,
            "target": l.target_id,
        })).collect::<Vec<_>>(),
    })
}

/// Handle get_citation_graph tool
pub async fn handle_citation_graph(
    builder: &CitationGraphBuilder,
    defaults: &GraphConfig,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: GraphParams = match serde_json::from_value(arguments.clone()) {
        Ok(params) => params,
        Err(e) => return Ok(invalid_arguments("get_citation_graph", e)),
    };

    let depth = params.depth.unwrap_or(defaults.default_depth as i64);
    let max_citations = params.max_citations.unwrap_or(defaults.default_max_citations as i64);
    let direction = params
        .direction
        .unwrap_or_else(|| defaults.default_direction.clone());

    match builder
        .build_citation_graph(&params.paper_ids, depth, max_citations, &direction)
        .await
    {
        Ok(graph) => pretty(&graph_to_json(&graph)),
        Err(e) => Ok(tool_error("get_citation_graph", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::ConnectorRegistry;
    use crate::graph::mock::{paper, MockConnector, MockDoiLookup};
    use crate::models::Author;
    use std::sync::Arc;

    fn builder() -> CitationGraphBuilder {
        let mut seed = paper("arxiv:1111.1111", "Seed");
        seed.authors = vec![Author::new("Ada Lovelace")];
        seed.journal = Some("Notes".to_string());
        let arxiv = MockConnector::new("arxiv")
            .with_paper(seed)
            .with_paper(paper("arxiv:2222.2222", "Cited work"))
            .with_cited("arxiv:1111.1111", &["arxiv:2222.2222"]);
        let registry = ConnectorRegistry::new().with(Arc::new(arxiv));
        CitationGraphBuilder::new(registry, Arc::new(MockDoiLookup::new()))
    }

    fn body(result: &ToolsCallResult) -> Value {
        serde_json::from_str(&result.content[0].text).unwrap()
    }

    #[test]
    fn test_tool_definitions() {
        let names: Vec<String> = get_tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["search_papers", "fetch_paper_metadata", "get_citation_graph"]);
    }

    #[tokio::test]
    async fn test_citation_graph_wire_shape() {
        let args = json!({"paper_ids": ["arxiv:1111.1111"], "depth": 1, "direction": "cited"});
        let result = handle_citation_graph(&builder(), &GraphConfig::default(), &args)
            .await
            .unwrap();
        assert!(result.is_error.is_none());

        let graph = body(&result);
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(graph["nodes"][0]["id"], json!("arxiv:1111.1111"));
        assert_eq!(graph["nodes"][0]["authors"], json!(["Ada Lovelace"]));
        assert_eq!(graph["nodes"][0]["journal"], json!("Notes"));
        assert_eq!(graph["nodes"][0]["source"], json!("arxiv"));
        assert_eq!(
            graph["links"],
            json!([{"source": "arxiv:1111.1111", "target": "arxiv:2222.2222"}])
        );
    }

    #[tokio::test]
    async fn test_invalid_graph_arguments_are_tool_errors() {
        let b = builder();
        let defaults = GraphConfig::default();
        for args in [
            json!({"paper_ids": ["arxiv:1111.1111"], "depth": -1}),
            json!({"paper_ids": ["arxiv:1111.1111"], "direction": "sideways"}),
            json!({"paper_ids": []}),
            json!({"depth": 1}),
        ] {
            let result = handle_citation_graph(&b, &defaults, &args).await.unwrap();
            assert_eq!(result.is_error, Some(true), "{}", args);
        }
    }

    #[tokio::test]
    async fn test_fetch_tool() {
        let b = builder();
        let ok = handle_fetch(&b, &json!({"paper_id": "arxiv:2222.2222"})).await.unwrap();
        assert_eq!(body(&ok)["title"], json!("Cited work"));

        let missing = handle_fetch(&b, &json!({"paper_id": "arxiv:9999.9999"})).await.unwrap();
        assert_eq!(missing.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_search_tool() {
        let b = builder();
        let args = json!({"query": "cited", "sources": ["arxiv"], "sort_by": "date"});
        let result = handle_search(&b, &args).await.unwrap();
        let found = body(&result);
        assert_eq!(found["total_found"], json!(1));
        assert_eq!(found["papers"][0]["id"], json!("arxiv:2222.2222"));
        assert_eq!(
            found["sources"],
            json!([{"source": "arxiv", "status": "success", "count": 1}])
        );

        let bad = handle_search(&b, &json!({"query": "x", "sort_by": "hotness"})).await.unwrap();
        assert_eq!(bad.is_error, Some(true));
        let zero = handle_search(&b, &json!({"query": "x", "max_results": 0})).await.unwrap();
        assert_eq!(zero.is_error, Some(true));
    }
}
