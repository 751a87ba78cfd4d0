pub mod cache;
pub mod config;
pub mod connectors;
pub mod crossref;
pub mod error;
pub mod graph;
pub mod mcp;
pub mod models;
pub mod search;

pub use config::Config;
pub use connectors::{Connector, ConnectorRegistry};
pub use crossref::{CrossrefClient, DoiLookup};
pub use error::{CitegraphError, Result, SourceError};
pub use graph::{CitationGraphBuilder, GraphRequest};
pub use models::{
    Author, CitationGraph, CitationLink, Direction, Paper, SearchQuery, SearchResult, SortBy, SourceOutcome, SourceStatus,
};
pub use search::search_papers;
