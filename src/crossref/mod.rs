//! DOI bibliographic lookup backed by the Crossref REST API.

pub mod convert;

pub use convert::{work_to_paper, CrossrefWork};

use async_trait::async_trait;

use crate::connectors::http::endpoint;
use crate::connectors::HttpClient;
use crate::error::SourceError;
use convert::{CrossrefEnvelope, CrossrefWorkList};

const API_URL: &str = "https://api.crossref.org";

/// DOI-indexed bibliographic database used when no connector owns an id.
///
/// Every method is a single upstream request.
#[async_trait]
pub trait DoiLookup: Send + Sync {
    async fn lookup_by_doi(&self, doi: &str) -> Result<CrossrefWork, SourceError>;

    /// Works whose reference list contains `doi`, at most `limit`.
    async fn find_citing_works(&self, doi: &str, limit: usize) -> Result<Vec<CrossrefWork>, SourceError>;

    /// DOIs in the reference list of `doi`, in order, at most `limit`.
    async fn reference_dois(&self, doi: &str, limit: usize) -> Result<Vec<String>, SourceError>;
}

/// Crossref client
pub struct CrossrefClient {
    http: HttpClient,
    api_url: String,
    mailto: Option<String>,
}

impl CrossrefClient {
    /// `mailto` opts into Crossref's polite pool.
    pub fn new(http: HttpClient, mailto: Option<String>) -> Self {
        Self {
            http,
            api_url: API_URL.to_string(),
            mailto: mailto.filter(|m| !m.is_empty()),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn polite(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        params
    }
}

/// Strip `doi:` and resolver URL prefixes, leaving the bare DOI.
pub fn bare_doi(doi: &str) -> &str {
    let doi = doi.trim();
    let lower = doi.to_ascii_lowercase();
    for prefix in ["doi:", "https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/"] {
        if lower.starts_with(prefix) {
            return doi[prefix.len()..].trim();
        }
    }
    doi
}

/// `true` for `doi:` ids, bare `10.` DOIs and doi.org URLs.
pub fn is_doi_shaped(id: &str) -> bool {
    let bare = bare_doi(id);
    bare.starts_with("10.") && bare.contains('/')
}

#[async_trait]
impl DoiLookup for CrossrefClient {
    async fn lookup_by_doi(&self, doi: &str) -> Result<CrossrefWork, SourceError> {
        let doi = bare_doi(doi);
        let url = endpoint(&self.api_url, &["works", doi])?;
        let params = self.polite(Vec::new());
        let what = format!("crossref work {}", doi);

        let envelope: CrossrefEnvelope<CrossrefWork> = self
            .http
            .get_json(&what, |c| c.get(url.as_str()).query(&params))
            .await
            .map_err(|e| match e {
                SourceError::NotFound(_) => SourceError::NotFound(format!("doi:{}", doi)),
                other => other,
            })?;
        Ok(envelope.message)
    }

    async fn find_citing_works(&self, doi: &str, limit: usize) -> Result<Vec<CrossrefWork>, SourceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let doi = bare_doi(doi);
        let url = format!("{}/works", self.api_url);
        let params = self.polite(vec![
            ("filter", format!("references:{}", doi)),
            ("rows", limit.to_string()),
        ]);

        let envelope: CrossrefEnvelope<CrossrefWorkList> = self
            .http
            .get_json("crossref citing works", |c| c.get(&url).query(&params))
            .await?;
        log::debug!(
            "Crossref reports {} works citing {}",
            envelope.message.total_results.unwrap_or(0),
            doi
        );

        let mut works = envelope.message.items;
        works.truncate(limit);
        Ok(works)
    }

    async fn reference_dois(&self, doi: &str, limit: usize) -> Result<Vec<String>, SourceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut dois = self.lookup_by_doi(doi).await?.reference_dois();
        dois.truncate(limit);
        Ok(dois)
    }
}
