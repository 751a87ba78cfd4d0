//! Node index with cross-namespace aliasing.
//!
//! A paper reached as `arxiv:X` and as `doi:D` is one node when both records
//! carry the same DOI. The first record inserted keeps its id as canonical,
//! except that a connector record takes over from a Crossref one.

use std::collections::HashMap;

use crate::crossref::{bare_doi, is_doi_shaped};
use crate::models::{Paper, CROSSREF_SOURCE};

#[derive(Debug, Default)]
pub(crate) struct NodeIndex {
    nodes: Vec<Paper>,
    by_id: HashMap<String, usize>,
    by_doi: HashMap<String, usize>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn slot(&self, id: &str) -> Option<usize> {
        if let Some(&slot) = self.by_id.get(id) {
            return Some(slot);
        }
        if is_doi_shaped(id) {
            return self.by_doi.get(&bare_doi(id).to_lowercase()).copied();
        }
        None
    }

    /// Canonical id of the node known under `id`, if any.
    pub fn canonical(&self, id: &str) -> Option<&str> {
        self.slot(id).map(|slot| self.nodes[slot].paper_id.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slot(id).is_some()
    }

    /// Insert `paper` unless it is already known by id or DOI; returns the canonical id.
    pub fn insert(&mut self, paper: Paper) -> String {
        let existing = self.slot(&paper.paper_id).or_else(|| {
            paper
                .doi_key()
                .and_then(|doi| self.by_doi.get(&doi).copied())
        });

        let slot = match existing {
            Some(slot) => {
                self.by_id.entry(paper.paper_id.clone()).or_insert(slot);
                // A connector record replaces a Crossref stand-in for the same work
                if self.nodes[slot].source == CROSSREF_SOURCE && paper.source != CROSSREF_SOURCE {
                    self.nodes[slot] = paper;
                }
                slot
            }
            None => {
                let slot = self.nodes.len();
                self.by_id.insert(paper.paper_id.clone(), slot);
                self.nodes.push(paper);
                slot
            }
        };

        if let Some(doi) = self.nodes[slot].doi_key() {
            self.by_doi.entry(doi).or_insert(slot);
        }
        self.nodes[slot].paper_id.clone()
    }

    /// Record `alias` as another name of an existing node.
    pub fn alias(&mut self, alias: &str, canonical: &str) {
        if let Some(slot) = self.slot(canonical) {
            self.by_id.entry(alias.to_string()).or_insert(slot);
        }
    }

    pub fn into_nodes(self) -> Vec<Paper> {
        self.nodes
    }
}
