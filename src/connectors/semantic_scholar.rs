//! Semantic Scholar connector (Graph API v1).
//!
//! Metadata lookups request `references.paperId` and `citations.paperId` so the
//! citation expander can use the native lists instead of a DOI round-trip.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::http::{endpoint, HttpClient};
use super::Connector;
use crate::error::SourceError;
use crate::models::{prefixed, Author, CitationKind, Paper, SearchQuery, SortBy};

const SOURCE: &str = "semanticscholar";
const API_URL: &str = "https://api.semanticscholar.org/graph/v1";

const SEARCH_FIELDS: &str =
    "paperId,externalIds,url,title,abstract,venue,year,publicationDate,journal,authors,citationCount,openAccessPdf,fieldsOfStudy";
const DETAIL_FIELDS: &str = "paperId,externalIds,url,title,abstract,venue,year,publicationDate,journal,authors,citationCount,openAccessPdf,fieldsOfStudy,references.paperId,citations.paperId";

/// Semantic Scholar connector
pub struct SemanticScholarConnector {
    http: HttpClient,
    api_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct S2Paper {
    #[serde(default)]
    paper_id: Option<String>,
    #[serde(default)]
    external_ids: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    journal: Option<S2Journal>,
    #[serde(default)]
    authors: Vec<S2Author>,
    #[serde(default)]
    citation_count: Option<u64>,
    #[serde(default)]
    open_access_pdf: Option<S2OpenAccessPdf>,
    #[serde(default)]
    fields_of_study: Option<Vec<String>>,
    #[serde(default)]
    references: Option<Vec<S2PaperRef>>,
    #[serde(default)]
    citations: Option<Vec<S2PaperRef>>,
}

#[derive(Debug, Clone, Deserialize)]
struct S2Journal {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct S2Author {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct S2OpenAccessPdf {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2PaperRef {
    #[serde(default)]
    paper_id: Option<String>,
}

impl SemanticScholarConnector {
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            api_url: API_URL.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }
}

#[async_trait]
impl Connector for SemanticScholarConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let url = format!("{}/paper/search", self.api_url);
        // The API caps a page at 100
        let limit = query.max_results.clamp(1, 100);
        let params = [
            ("query", query.query.clone()),
            ("limit", limit.to_string()),
            ("fields", SEARCH_FIELDS.to_string()),
        ];
        let response: SearchResponse = self
            .http
            .get_json("semanticscholar search", |c| {
                self.authorize(c.get(&url).query(&params))
            })
            .await?;
        log::debug!(
            "Semantic Scholar reports {} total hits for '{}'",
            response.total.unwrap_or(0),
            query.query
        );

        let mut papers: Vec<Paper> = response.data.into_iter().filter_map(s2_to_paper).collect();
        if query.sort_by == SortBy::Citations {
            papers.sort_by(|a, b| b.citations_count.cmp(&a.citations_count));
        }
        papers.truncate(query.max_results);
        Ok(papers)
    }

    async fn get_metadata(&self, paper_id: &str) -> Result<Paper, SourceError> {
        let normalized = self.parse_id(paper_id);
        let native = normalized
            .strip_prefix("semanticscholar:")
            .unwrap_or(&normalized)
            .to_string();
        let url = endpoint(&self.api_url, &["paper", native.as_str()])?;
        let what = format!("semanticscholar paper {}", native);

        let raw: S2Paper = self
            .http
            .get_json(&what, |c| {
                self.authorize(c.get(url.as_str()).query(&[("fields", DETAIL_FIELDS)]))
            })
            .await
            .map_err(|e| match e {
                SourceError::NotFound(_) => SourceError::NotFound(prefixed(SOURCE, &native)),
                other => other,
            })?;

        s2_to_paper(raw).ok_or_else(|| SourceError::Parse(format!("{} has no paperId", what)))
    }

    async fn download_full_text(&self, paper_id: &str) -> Result<Vec<u8>, SourceError> {
        let paper = self.get_metadata(paper_id).await?;
        let pdf_url = paper.pdf_url.ok_or_else(|| {
            SourceError::Unsupported(format!("No open access PDF available for {}", paper_id))
        })?;
        self.http.download_pdf("semanticscholar pdf", &pdf_url).await
    }

    fn parse_id(&self, external_id: &str) -> String {
        let trimmed = external_id.trim();

        if let Some((prefix, rest)) = trimmed.split_once(':') {
            if prefix.eq_ignore_ascii_case(SOURCE) {
                let rest = rest.trim();
                return if rest.is_empty() {
                    external_id.to_string()
                } else {
                    prefixed(SOURCE, rest)
                };
            }
        }

        if trimmed.contains("semanticscholar.org/paper/") {
            let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
            if let Some(id) = path.rsplit('/').find(|seg| is_s2_id(seg)) {
                return prefixed(SOURCE, &id.to_lowercase());
            }
        }

        if is_s2_id(trimmed) {
            return prefixed(SOURCE, &trimmed.to_lowercase());
        }

        external_id.to_string()
    }

    fn native_citations(&self, paper: &Paper, kind: CitationKind) -> Option<Vec<String>> {
        if paper.source != SOURCE {
            return None;
        }
        let key = match kind {
            CitationKind::Citing => "citations",
            CitationKind::Cited => "references",
        };
        let ids = paper.raw_metadata.get(key)?.as_array()?;
        Some(
            ids.iter()
                .filter_map(|v| v.as_str())
                .map(|id| prefixed(SOURCE, id))
                .collect(),
        )
    }
}

/// 40-character hex corpus hash.
fn is_s2_id(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn ref_ids(refs: Option<Vec<S2PaperRef>>) -> Option<Vec<String>> {
    refs.map(|list| list.into_iter().filter_map(|r| r.paper_id).collect())
}

pub(crate) fn s2_to_paper(raw: S2Paper) -> Option<Paper> {
    let id = raw.paper_id?;

    let doi = raw
        .external_ids
        .as_ref()
        .and_then(|ids| ids.get("DOI"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let publication_date = raw
        .publication_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .or_else(|| raw.year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)));

    let journal = raw
        .journal
        .and_then(|j| j.name)
        .filter(|n| !n.is_empty())
        .or(raw.venue.filter(|v| !v.is_empty()));

    let mut paper = Paper::new(prefixed(SOURCE, &id), raw.title.unwrap_or_default(), SOURCE);
    paper.authors = raw
        .authors
        .into_iter()
        .filter_map(|a| a.name)
        .filter(|n| !n.is_empty())
        .map(Author::new)
        .collect();
    paper.r#abstract = raw.abstract_text;
    paper.url = raw
        .url
        .or_else(|| Some(format!("https://www.semanticscholar.org/paper/{}", id)));
    paper.pdf_url = raw.open_access_pdf.and_then(|p| p.url).filter(|u| !u.is_empty());
    paper.publication_date = publication_date;
    paper.journal = journal;
    paper.doi = doi;
    paper.citations_count = raw.citation_count;

    let mut metadata = json!({
        "external_ids": raw.external_ids.unwrap_or_default(),
        "s2_fields": raw.fields_of_study.unwrap_or_default(),
    });
    if let Some(refs) = ref_ids(raw.references) {
        metadata["references_count"] = json!(refs.len());
        metadata["references"] = json!(refs);
    }
    if let Some(cites) = ref_ids(raw.citations) {
        metadata["citations_count"] = json!(cites.len());
        metadata["citations"] = json!(cites);
    }
    paper.raw_metadata = metadata;
    Some(paper)
}
