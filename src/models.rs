//! Canonical paper and citation graph records shared by every source.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::CitegraphError;

/// Namespace separator inside a PaperID (`arxiv:2104.08935`).
pub const ID_SEPARATOR: char = ':';

/// Source tag stamped on papers built from DOI-fallback lookups.
pub const CROSSREF_SOURCE: &str = "crossref";

/// Split a PaperID into `(namespace, native id)` when it carries a prefix.
pub fn split_prefix(id: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = id.split_once(ID_SEPARATOR)?;
    if prefix.is_empty() || rest.is_empty() {
        return None;
    }
    Some((prefix, rest))
}

/// Strip a `namespace:` prefix if present, leaving the native id.
pub fn native_id(id: &str) -> &str {
    split_prefix(id).map(|(_, rest)| rest).unwrap_or(id)
}

/// Build a prefixed PaperID.
pub fn prefixed(namespace: &str, native: &str) -> String {
    format!("{}{}{}", namespace, ID_SEPARATOR, native)
}

/// A paper author. Dedup compares `name` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
            email: None,
        }
    }
}

impl PartialEq for Author {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Author {}

/// Canonical paper record.
///
/// `raw_metadata` holds provenance-specific extras and is never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#abstract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw_metadata: Value,
}

impl Paper {
    /// Minimal record; connectors fill in the optional fields.
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: title.into(),
            authors: Vec::new(),
            r#abstract: None,
            url: None,
            pdf_url: None,
            publication_date: None,
            journal: None,
            doi: None,
            source: source.into(),
            citations_count: None,
            raw_metadata: Value::Null,
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.publication_date.map(|d| d.year())
    }

    /// Lowercased DOI, used as the cross-namespace identity key.
    pub fn doi_key(&self) -> Option<String> {
        self.doi
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_lowercase)
    }

    pub fn author_names(&self) -> Vec<String> {
        self.authors.iter().map(|a| a.name.clone()).collect()
    }
}

/// Directed edge: `source_id` cites `target_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationLink {
    pub source_id: String,
    pub target_id: String,
}

impl CitationLink {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }
}

/// Papers keyed by PaperID plus the citation edges between them.
///
/// Edge endpoints without a node are dangling references (fetch failed).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationGraph {
    pub nodes: Vec<Paper>,
    pub links: Vec<CitationLink>,
}

impl CitationGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn node(&self, paper_id: &str) -> Option<&Paper> {
        self.nodes.iter().find(|p| p.paper_id == paper_id)
    }

    /// Edge endpoints that never became nodes.
    pub fn dangling_ids(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for link in &self.links {
            for id in [link.source_id.as_str(), link.target_id.as_str()] {
                if self.node(id).is_none() && !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }
}

/// Which citation edges to follow from each expanded paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Both,
    /// Papers that cite the expanded paper.
    Citing,
    /// Papers the expanded paper cites.
    Cited,
}

impl Direction {
    pub fn includes_citing(self) -> bool {
        matches!(self, Direction::Both | Direction::Citing)
    }

    pub fn includes_cited(self) -> bool {
        matches!(self, Direction::Both | Direction::Cited)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Both => "both",
            Direction::Citing => "citing",
            Direction::Cited => "cited",
        }
    }
}

impl FromStr for Direction {
    type Err = CitegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "both" => Ok(Direction::Both),
            "citing" => Ok(Direction::Citing),
            "cited" => Ok(Direction::Cited),
            other => Err(CitegraphError::InvalidInput(format!(
                "direction must be one of both|citing|cited, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a paper's citation neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CitationKind {
    /// Papers citing this one.
    Citing,
    /// Papers this one cites.
    Cited,
}

impl CitationKind {
    /// The edge between `this` paper and a `neighbor` on this side.
    pub fn link(self, this: &str, neighbor: &str) -> CitationLink {
        match self {
            CitationKind::Citing => CitationLink::new(neighbor, this),
            CitationKind::Cited => CitationLink::new(this, neighbor),
        }
    }
}

/// Result ordering for searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
    Citations,
}

impl FromStr for SortBy {
    type Err = CitegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relevance" => Ok(SortBy::Relevance),
            "date" => Ok(SortBy::Date),
            "citations" => Ok(SortBy::Citations),
            other => Err(CitegraphError::InvalidInput(format!(
                "sort_by must be one of relevance|date|citations, got '{}'",
                other
            ))),
        }
    }
}

/// Free-text search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub sort_by: SortBy,
}

fn default_sources() -> Vec<String> {
    vec![
        "arxiv".to_string(),
        "pubmed".to_string(),
        "semanticscholar".to_string(),
    ]
}

fn default_max_results() -> usize {
    20
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sources: default_sources(),
            max_results: default_max_results(),
            sort_by: SortBy::default(),
        }
    }
}

/// How one requested source fared in a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Error,
    /// Requested but not registered.
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub status: SourceStatus,
    /// Hits returned before merging and truncation.
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Merged search output across sources.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub papers: Vec<Paper>,
    pub total_found: usize,
    /// One entry per requested source, in request order.
    pub sources: Vec<SourceOutcome>,
}
