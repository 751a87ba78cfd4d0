//! Identifier resolution: which connector (or the DOI fallback) owns an id.

use std::fmt;
use std::sync::Arc;

use crate::connectors::{Connector, ConnectorRegistry};
use crate::crossref::{bare_doi, is_doi_shaped};
use crate::error::{CitegraphError, Result};
use crate::models::{prefixed, split_prefix};

/// Where a paper id will be fetched from.
#[derive(Clone)]
pub enum Resolution {
    /// A registered connector claimed the id; `paper_id` is its normalized form.
    Connector {
        connector: Arc<dyn Connector>,
        paper_id: String,
    },
    /// No connector claimed it but it looks like a DOI.
    Doi(String),
}

impl Resolution {
    /// Normalized PaperID (`doi:<doi>` for the fallback path).
    pub fn paper_id(&self) -> String {
        match self {
            Resolution::Connector { paper_id, .. } => paper_id.clone(),
            Resolution::Doi(doi) => prefixed("doi", doi),
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            Resolution::Connector { connector, .. } => connector.name(),
            Resolution::Doi(_) => "doi",
        }
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Connector { connector, paper_id } => f
                .debug_struct("Connector")
                .field("source", &connector.name())
                .field("paper_id", paper_id)
                .finish(),
            Resolution::Doi(doi) => f.debug_tuple("Doi").field(doi).finish(),
        }
    }
}

/// Maps opaque id strings onto connectors in registration order.
pub struct IdentifierResolver<'a> {
    registry: &'a ConnectorRegistry,
}

impl<'a> IdentifierResolver<'a> {
    pub fn new(registry: &'a ConnectorRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, id: &str) -> Result<Resolution> {
        // 1. Explicit namespace naming a registered connector
        if let Some((prefix, _)) = split_prefix(id.trim()) {
            if let Some(connector) = self.registry.get(&prefix.to_ascii_lowercase()) {
                let paper_id = connector.parse_id(id);
                log::debug!("Resolved {} by prefix to {}", id, paper_id);
                return Ok(Resolution::Connector {
                    connector: Arc::clone(connector),
                    paper_id,
                });
            }
        }

        // 2. First connector whose parse_id rewrites the input
        for connector in self.registry.iter() {
            let parsed = connector.parse_id(id);
            if parsed != id {
                log::debug!("Resolved {} via {} to {}", id, connector.name(), parsed);
                return Ok(Resolution::Connector {
                    connector: Arc::clone(connector),
                    paper_id: parsed,
                });
            }
        }

        // 3. DOI fallback
        if is_doi_shaped(id) {
            return Ok(Resolution::Doi(bare_doi(id).to_string()));
        }

        Err(CitegraphError::UnresolvedIdentifier(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::MockConnector;

    fn registry() -> ConnectorRegistry {
        ConnectorRegistry::new()
            .with(Arc::new(MockConnector::new("arxiv")))
            .with(Arc::new(MockConnector::new("pubmed").claiming_digits()))
    }

    #[test]
    fn test_prefix_selects_connector() {
        let registry = registry();
        let resolver = IdentifierResolver::new(&registry);
        let resolution = resolver.resolve("arxiv:1111.1111").unwrap();
        assert_eq!(resolution.source_name(), "arxiv");
        assert_eq!(resolution.paper_id(), "arxiv:1111.1111");

        let upper = resolver.resolve("PubMed:42").unwrap();
        assert_eq!(upper.source_name(), "pubmed");
    }

    #[test]
    fn test_claims_checked_in_registration_order() {
        let registry = registry();
        let resolver = IdentifierResolver::new(&registry);
        let resolution = resolver.resolve("31452104").unwrap();
        assert_eq!(resolution.source_name(), "pubmed");
        assert_eq!(resolution.paper_id(), "pubmed:31452104");
    }

    #[test]
    fn test_doi_fallback() {
        let registry = registry();
        let resolver = IdentifierResolver::new(&registry);
        let resolution = resolver.resolve("doi:10.1/xyz").unwrap();
        assert!(matches!(resolution, Resolution::Doi(ref d) if d == "10.1/xyz"));
        assert_eq!(resolution.paper_id(), "doi:10.1/xyz");

        let bare = resolver.resolve("10.1145/3292500").unwrap();
        assert_eq!(bare.paper_id(), "doi:10.1145/3292500");
    }

    #[test]
    fn test_unresolved() {
        let registry = registry();
        let resolver = IdentifierResolver::new(&registry);
        let err = resolver.resolve("openalex:W123").unwrap_err();
        assert!(matches!(err, CitegraphError::UnresolvedIdentifier(ref id) if id == "openalex:W123"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = ConnectorRegistry::new()
            .with(Arc::new(MockConnector::new("first").claiming_digits()))
            .with(Arc::new(MockConnector::new("second").claiming_digits()));
        let resolver = IdentifierResolver::new(&registry);
        for _ in 0..10 {
            assert_eq!(resolver.resolve("123").unwrap().source_name(), "first");
        }
    }
}
