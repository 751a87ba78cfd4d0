//! Google Scholar connector.
//!
//! Scholar has no API; results are scraped from the HTML result page. Only
//! enabled when `sources.google_scholar_enabled` is set, since Scholar rate
//! limits aggressively and answers with a captcha page when it does.

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use url::Url;

use super::http::HttpClient;
use super::xml::expand_reference;
use super::Connector;
use crate::error::SourceError;
use crate::models::{prefixed, Author, Paper, SearchQuery, SortBy};

const SOURCE: &str = "googlescholar";
const BASE_URL: &str = "https://scholar.google.com";
/// Scholar serves at most this many hits per page.
const PAGE_SIZE: usize = 20;

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("Invalid regex pattern"))
        }
    };
}

static_regex!(result_block, r#"<div class="gs_r gs_or gs_scl"[^>]*>"#);
static_regex!(title_re, r#"(?s)<h3 class="gs_rt"[^>]*>(.*?)</h3>"#);
static_regex!(link_re, r#"(?s)<h3 class="gs_rt"[^>]*>.*?<a[^>]*href="([^"]+)""#);
static_regex!(byline_re, r#"(?s)<div class="gs_a"[^>]*>(.*?)</div>"#);
static_regex!(snippet_re, r#"(?s)<div class="gs_rs"[^>]*>(.*?)</div>"#);
static_regex!(cited_by_re, r#"<a href="[^"]*cites=(\d+)[^"]*"[^>]*>Cited by (\d+)</a>"#);
static_regex!(cluster_re, r#"cluster=(\d+)"#);
static_regex!(pdf_re, r#"(?s)<div class="gs_or_ggsm"[^>]*>\s*<a href="([^"]+)""#);
static_regex!(year_re, r#"\b(1[89]\d{2}|20\d{2})\b"#);
static_regex!(tag_re, r#"<[^>]+>"#);
static_regex!(marker_re, r#"^\s*\[(?:PDF|HTML|BOOK|B|CITATION|C)\]\s*"#);
static_regex!(entity_re, r#"&(#[xX][0-9a-fA-F]+|#\d+|[a-zA-Z]+);"#);

/// Google Scholar connector
pub struct GoogleScholarConnector {
    http: HttpClient,
    base_url: String,
}

impl GoogleScholarConnector {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_page(&self, what: &str, params: &[(&str, String)]) -> Result<Vec<Paper>, SourceError> {
        let url = format!("{}/scholar", self.base_url);
        let body = self
            .http
            .get_text(what, |c| c.get(&url).query(params))
            .await?;
        if is_blocked(&body) {
            return Err(SourceError::Network(
                "Google Scholar blocked the request (captcha)".to_string(),
            ));
        }
        Ok(parse_results(&body))
    }
}

#[async_trait]
impl Connector for GoogleScholarConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let mut params = vec![
            ("q", query.query.clone()),
            ("hl", "en".to_string()),
            ("num", query.max_results.clamp(1, PAGE_SIZE).to_string()),
        ];
        if query.sort_by == SortBy::Date {
            params.push(("scisbd", "1".to_string()));
        }
        let mut papers = self.fetch_page("googlescholar search", &params).await?;
        if query.sort_by == SortBy::Citations {
            papers.sort_by(|a, b| b.citations_count.cmp(&a.citations_count));
        }
        papers.truncate(query.max_results);
        Ok(papers)
    }

    async fn get_metadata(&self, paper_id: &str) -> Result<Paper, SourceError> {
        let normalized = self.parse_id(paper_id);
        let cluster = normalized
            .strip_prefix("googlescholar:")
            .unwrap_or(&normalized)
            .to_string();
        let params = [("cluster", cluster.clone()), ("hl", "en".to_string())];
        let papers = self.fetch_page("googlescholar cluster", &params).await?;

        // A cluster page lists versions of one work; prefer the one matching the id.
        let wanted = prefixed(SOURCE, &cluster);
        let mut iter = papers.into_iter();
        let first = iter.next();
        let matching = first
            .as_ref()
            .filter(|p| p.paper_id == wanted)
            .cloned()
            .or_else(|| iter.find(|p| p.paper_id == wanted));

        match matching.or(first) {
            Some(mut paper) => {
                paper.paper_id = wanted;
                Ok(paper)
            }
            None => Err(SourceError::NotFound(wanted)),
        }
    }

    async fn download_full_text(&self, paper_id: &str) -> Result<Vec<u8>, SourceError> {
        let paper = self.get_metadata(paper_id).await?;
        let pdf_url = paper.pdf_url.ok_or_else(|| {
            SourceError::Unsupported(format!("No PDF link listed for {}", paper_id))
        })?;
        self.http.download_pdf("googlescholar pdf", &pdf_url).await
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

        if trimmed.contains("scholar.google.") {
            if let Ok(url) = Url::parse(trimmed) {
                let cluster = url
                    .query_pairs()
                    .find(|(k, _)| k == "cluster" || k == "cites")
                    .map(|(_, v)| v.into_owned())
                    .filter(|v| !v.is_empty());
                if let Some(cluster) = cluster {
                    return prefixed(SOURCE, &cluster);
                }
            }
        }

        external_id.to_string()
    }
}

fn is_blocked(body: &str) -> bool {
    body.contains("gs_captcha") || body.contains("id=\"captcha\"") || body.contains("unusual traffic")
}

/// Strip tags and decode entities in an HTML fragment.
fn html_text(fragment: &str) -> String {
    let stripped = tag_re().replace_all(fragment, "");
    let decoded = entity_re().replace_all(&stripped, |caps: &regex::Captures| match &caps[1] {
        "nbsp" => " ".to_string(),
        "hellip" => "…".to_string(),
        name => expand_reference(name.as_bytes()),
    });
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byline fields from the `gs_a` line: `Authors - Venue, Year - Publisher`.
#[derive(Debug, Default, PartialEq)]
struct Byline {
    authors: Vec<String>,
    venue: Option<String>,
    year: Option<i32>,
    publisher: Option<String>,
}

fn parse_byline(text: &str) -> Byline {
    let parts: Vec<&str> = text.split(" - ").map(str::trim).collect();
    let authors = parts
        .first()
        .map(|a| {
            a.split(',')
                .map(|n| n.trim().trim_end_matches('…').trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let (venue, year) = match parts.get(1) {
        Some(middle) => {
            let year = year_re()
                .captures_iter(middle)
                .last()
                .and_then(|c| c[1].parse::<i32>().ok());
            let venue = match year_re().find_iter(middle).last() {
                Some(m) => middle[..m.start()].trim().trim_end_matches(',').trim(),
                None => middle,
            };
            let venue = venue.trim_start_matches('…').trim_end_matches('…').trim();
            (Some(venue.to_string()).filter(|v| !v.is_empty()), year)
        }
        None => (None, None),
    };

    Byline {
        authors,
        venue,
        year,
        publisher: parts.get(2).map(|p| p.to_string()).filter(|p| !p.is_empty()),
    }
}

/// Parse every organic result block on a Scholar result page.
pub(crate) fn parse_results(html: &str) -> Vec<Paper> {
    let starts: Vec<usize> = result_block().find_iter(html).map(|m| m.start()).collect();
    let mut papers = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let block = &html[start..end];

        let Some(title) = title_re().captures(block).map(|c| html_text(&c[1])) else {
            continue;
        };
        let title = marker_re().replace(&title, "").trim().to_string();
        if title.is_empty() {
            continue;
        }

        let cited_by = cited_by_re().captures(block);
        let cluster = cluster_re()
            .captures(block)
            .map(|c| c[1].to_string())
            .or_else(|| cited_by.as_ref().map(|c| c[1].to_string()));
        let Some(cluster) = cluster else {
            log::debug!("Skipping Scholar result without a cluster id: {}", title);
            continue;
        };

        let byline = byline_re()
            .captures(block)
            .map(|c| parse_byline(&html_text(&c[1])))
            .unwrap_or_default();

        let mut paper = Paper::new(prefixed(SOURCE, &cluster), title, SOURCE);
        paper.authors = byline.authors.into_iter().map(Author::new).collect();
        paper.url = link_re().captures(block).map(|c| html_text(&c[1]));
        paper.pdf_url = pdf_re().captures(block).map(|c| html_text(&c[1]));
        paper.publication_date = byline.year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1));
        paper.journal = byline.venue;
        paper.citations_count = cited_by.and_then(|c| c[2].parse::<u64>().ok());
        paper.raw_metadata = json!({
            "snippet": snippet_re().captures(block).map(|c| html_text(&c[1])),
            "publisher": byline.publisher,
            "cluster_id": cluster,
        });
        papers.push(paper);
    }

    papers
}
