//! Citation graph core: identifier resolution, metadata fetching, citation
//! expansion and the bounded breadth-first build over them.
//!
//! Data flows builder -> resolver -> fetcher -> expander, and back to the
//! resolver for every newly discovered neighbor until the depth is used up.

mod expander;
mod fetcher;
mod index;
mod resolver;
mod traversal;

#[cfg(test)]
pub(crate) mod mock;

pub use expander::{CitationExpander, Neighbors};
pub use fetcher::{is_expected_miss, MetadataFetcher};
pub use resolver::{IdentifierResolver, Resolution};
pub use traversal::{BuildStats, CitationGraphBuilder, GraphRequest};
