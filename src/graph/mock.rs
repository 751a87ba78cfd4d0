//! In-memory connectors and DOI lookups for graph tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::connectors::Connector;
use crate::crossref::{bare_doi, CrossrefWork, DoiLookup};
use crate::error::SourceError;
use crate::models::{prefixed, split_prefix, CitationKind, Paper, SearchQuery, CROSSREF_SOURCE};

/// Paper whose source is its id namespace (`doi:` ids are Crossref's).
pub fn paper(id: &str, title: &str) -> Paper {
    let source = match split_prefix(id) {
        Some(("doi", _)) => CROSSREF_SOURCE,
        Some((namespace, _)) => namespace,
        None => "unknown",
    };
    Paper::new(id, title, source)
}

pub fn paper_with_doi(id: &str, title: &str, doi: &str) -> Paper {
    let mut p = paper(id, title);
    p.doi = Some(doi.to_string());
    p
}

pub fn work(doi: &str, title: &str) -> CrossrefWork {
    CrossrefWork {
        doi: Some(doi.to_string()),
        title: vec![title.to_string()],
        ..Default::default()
    }
}

pub struct MockConnector {
    name: String,
    claim_digits: bool,
    native: bool,
    papers: HashMap<String, Paper>,
    citing: HashMap<String, Vec<String>>,
    cited: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockConnector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            claim_digits: false,
            native: true,
            papers: HashMap::new(),
            citing: HashMap::new(),
            cited: HashMap::new(),
            failing: HashSet::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Also claim bare all-digit ids.
    pub fn claiming_digits(mut self) -> Self {
        self.claim_digits = true;
        self
    }

    /// Report no native citation lists, so expansion goes through DOIs.
    pub fn without_native_lists(mut self) -> Self {
        self.native = false;
        self
    }

    pub fn with_paper(mut self, paper: Paper) -> Self {
        self.papers.insert(paper.paper_id.clone(), paper);
        self
    }

    pub fn with_citing(mut self, id: &str, citing: &[&str]) -> Self {
        self.citing
            .insert(id.to_string(), citing.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_cited(mut self, id: &str, cited: &[&str]) -> Self {
        self.cited
            .insert(id.to_string(), cited.iter().map(|s| s.to_string()).collect());
        self
    }

    /// `get_metadata` for `id` fails with a transport error.
    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let needle = query.query.to_lowercase();
        let mut hits: Vec<Paper> = self
            .papers
            .values()
            .filter(|p| p.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.paper_id.cmp(&b.paper_id));
        hits.truncate(query.max_results);
        Ok(hits)
    }

    async fn get_metadata(&self, paper_id: &str) -> Result<Paper, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let id = self.parse_id(paper_id);
        if self.failing.contains(&id) {
            return Err(SourceError::Network(format!("connection reset fetching {}", id)));
        }
        self.papers
            .get(&id)
            .cloned()
            .ok_or(SourceError::NotFound(id))
    }

    async fn download_full_text(&self, paper_id: &str) -> Result<Vec<u8>, SourceError> {
        Err(SourceError::Unsupported(format!("no full text for {}", paper_id)))
    }

    fn parse_id(&self, external_id: &str) -> String {
        if let Some((prefix, rest)) = split_prefix(external_id) {
            if prefix.eq_ignore_ascii_case(&self.name) {
                return prefixed(&self.name, rest);
            }
        }
        if self.claim_digits && !external_id.is_empty() && external_id.bytes().all(|b| b.is_ascii_digit()) {
            return prefixed(&self.name, external_id);
        }
        external_id.to_string()
    }

    fn native_citations(&self, paper: &Paper, kind: CitationKind) -> Option<Vec<String>> {
        if !self.native || paper.source != self.name {
            return None;
        }
        let lists = match kind {
            CitationKind::Citing => &self.citing,
            CitationKind::Cited => &self.cited,
        };
        Some(lists.get(&paper.paper_id).cloned().unwrap_or_default())
    }
}

/// DOI lookup keyed by lowercase DOI.
#[derive(Default)]
pub struct MockDoiLookup {
    works: HashMap<String, CrossrefWork>,
    citing: HashMap<String, Vec<String>>,
    referenced: HashMap<String, Vec<String>>,
    fail_expansion: bool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockDoiLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_work(mut self, work: CrossrefWork) -> Self {
        if let Some(doi) = work.doi.clone() {
            self.works.insert(doi.to_lowercase(), work);
        }
        self
    }

    pub fn with_citing(mut self, doi: &str, citing: &[&str]) -> Self {
        self.citing
            .insert(doi.to_lowercase(), citing.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_referenced(mut self, doi: &str, referenced: &[&str]) -> Self {
        self.referenced
            .insert(doi.to_lowercase(), referenced.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Citing/referenced lookups fail with HTTP 503.
    pub fn failing_expansion(mut self) -> Self {
        self.fail_expansion = true;
        self
    }

    /// Every lookup sleeps for `delay` while counted as in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Most lookups that were ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn expansion_failure(&self) -> Result<(), SourceError> {
        if self.fail_expansion {
            return Err(SourceError::Http {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn track<T>(&self, result: T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl DoiLookup for MockDoiLookup {
    async fn lookup_by_doi(&self, doi: &str) -> Result<CrossrefWork, SourceError> {
        let key = bare_doi(doi).to_lowercase();
        let found = self
            .works
            .get(&key)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("doi:{}", key)));
        self.track(found).await
    }

    async fn find_citing_works(&self, doi: &str, limit: usize) -> Result<Vec<CrossrefWork>, SourceError> {
        self.expansion_failure()?;
        let citing = self
            .citing
            .get(&bare_doi(doi).to_lowercase())
            .into_iter()
            .flatten()
            .filter_map(|doi| self.works.get(&doi.to_lowercase()).cloned())
            .take(limit)
            .collect();
        self.track(Ok(citing)).await
    }

    async fn reference_dois(&self, doi: &str, limit: usize) -> Result<Vec<String>, SourceError> {
        self.expansion_failure()?;
        let dois = self
            .referenced
            .get(&bare_doi(doi).to_lowercase())
            .into_iter()
            .flatten()
            .take(limit)
            .cloned()
            .collect();
        self.track(Ok(dois)).await
    }
}
