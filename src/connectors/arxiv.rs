//! arXiv connector (export.arxiv.org Atom API).

use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;

use super::http::HttpClient;
use super::xml::{attr, collapse_whitespace, expand_reference, tag_name};
use super::Connector;
use crate::error::SourceError;
use crate::models::{prefixed, Author, Paper, SearchQuery, SortBy};

const SOURCE: &str = "arxiv";
const API_URL: &str = "http://export.arxiv.org/api/query";

fn new_style_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}\.\d{4,5})(v\d+)?$").expect("Invalid regex pattern"))
}

fn old_style_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-z][a-z\-]*(?:\.[A-Z]{2})?/\d{7})(v\d+)?$").expect("Invalid regex pattern")
    })
}

fn arxiv_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"arxiv\.org/(?:abs|pdf)/([^?#]+?)(?:\.pdf)?/?(?:[?#].*)?$").expect("Invalid regex pattern")
    })
}

/// Split a bare arXiv id into `(base, version)`; `None` if it is not an arXiv id.
pub fn split_version(raw: &str) -> Option<(String, Option<String>)> {
    let caps = new_style_id()
        .captures(raw)
        .or_else(|| old_style_id().captures(raw))?;
    let base = caps.get(1)?.as_str().to_string();
    let version = caps.get(2).map(|m| m.as_str().to_string());
    Some((base, version))
}

/// arXiv connector
pub struct ArxivConnector {
    http: HttpClient,
    api_url: String,
}

impl ArxivConnector {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            api_url: API_URL.to_string(),
        }
    }

    /// Point the connector at a different endpoint (mirrors, tests).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn query(&self, params: Vec<(&'static str, String)>) -> Result<Vec<Paper>, SourceError> {
        let body = self
            .http
            .get_text("arxiv query", |c| c.get(&self.api_url).query(&params))
            .await?;
        Ok(parse_feed(&body)?.into_iter().map(entry_to_paper).collect())
    }
}

#[async_trait]
impl Connector for ArxivConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let sort_by = match query.sort_by {
            SortBy::Date => "submittedDate",
            // arXiv has no citation counts
            SortBy::Relevance | SortBy::Citations => "relevance",
        };
        let params = vec![
            ("search_query", format!("all:{}", query.query)),
            ("start", "0".to_string()),
            ("max_results", query.max_results.to_string()),
            ("sortBy", sort_by.to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        let mut papers = self.query(params).await?;
        papers.truncate(query.max_results);
        Ok(papers)
    }

    async fn get_metadata(&self, paper_id: &str) -> Result<Paper, SourceError> {
        let normalized = self.parse_id(paper_id);
        let native = normalized.strip_prefix("arxiv:").unwrap_or(&normalized).to_string();
        let papers = self.query(vec![("id_list", native.clone())]).await?;
        papers
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(prefixed(SOURCE, &native)))
    }

    async fn download_full_text(&self, paper_id: &str) -> Result<Vec<u8>, SourceError> {
        let paper = self.get_metadata(paper_id).await?;
        let pdf_url = paper.pdf_url.ok_or_else(|| {
            SourceError::Unsupported(format!("No PDF URL available for paper {}", paper_id))
        })?;
        self.http.download_pdf("arxiv pdf", &pdf_url).await
    }

    fn parse_id(&self, external_id: &str) -> String {
        let trimmed = external_id.trim();

        if let Some((prefix, rest)) = trimmed.split_once(':') {
            if prefix.eq_ignore_ascii_case(SOURCE) {
                return match split_version(rest.trim()) {
                    Some((base, _)) => prefixed(SOURCE, &base),
                    None => external_id.to_string(),
                };
            }
        }

        if let Some(caps) = arxiv_url().captures(trimmed) {
            if let Some((base, _)) = caps.get(1).and_then(|m| split_version(m.as_str())) {
                return prefixed(SOURCE, &base);
            }
        }

        match split_version(trimmed) {
            Some((base, _)) => prefixed(SOURCE, &base),
            None => external_id.to_string(),
        }
    }
}

/// One `<entry>` of an arXiv Atom feed.
#[derive(Debug, Default, Clone)]
pub(crate) struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub updated: String,
    pub authors: Vec<Author>,
    pub pdf_url: Option<String>,
    pub abs_url: Option<String>,
    pub doi: Option<String>,
    pub journal_ref: Option<String>,
    pub comment: Option<String>,
    pub primary_category: Option<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    Updated,
    AuthorName,
    Affiliation,
    Doi,
    JournalRef,
    Comment,
}

fn field_for(tag: &str, in_author: bool) -> Option<Field> {
    match tag {
        "id" => Some(Field::Id),
        "title" => Some(Field::Title),
        "summary" => Some(Field::Summary),
        "published" => Some(Field::Published),
        "updated" => Some(Field::Updated),
        "name" if in_author => Some(Field::AuthorName),
        "arxiv:affiliation" if in_author => Some(Field::Affiliation),
        "arxiv:doi" => Some(Field::Doi),
        "arxiv:journal_ref" => Some(Field::JournalRef),
        "arxiv:comment" => Some(Field::Comment),
        _ => None,
    }
}

/// Parse an Atom feed into entries. Error entries (unknown ids) are skipped.
pub(crate) fn parse_feed(xml: &str) -> Result<Vec<ArxivEntry>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = tag_name(&e);
                match name.as_str() {
                    "entry" => current = Some(ArxivEntry::default()),
                    "author" if current.is_some() => {
                        in_author = true;
                        if let Some(entry) = current.as_mut() {
                            entry.authors.push(Author::new(String::new()));
                        }
                    }
                    _ if current.is_some() => {
                        field = field_for(&name, in_author);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let Some(entry) = current.as_mut() else {
                    buf.clear();
                    continue;
                };
                match tag_name(&e).as_str() {
                    "link" => {
                        let href = attr(&e, "href");
                        if attr(&e, "title").as_deref() == Some("pdf") {
                            entry.pdf_url = href;
                        } else if attr(&e, "rel").as_deref() == Some("alternate") {
                            entry.abs_url = href;
                        }
                    }
                    "category" => {
                        if let Some(term) = attr(&e, "term") {
                            entry.categories.push(term);
                        }
                    }
                    "arxiv:primary_category" => entry.primary_category = attr(&e, "term"),
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if field.is_some() {
                    let raw: &[u8] = &r;
                    text.push_str(&expand_reference(raw));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "entry" => {
                        if let Some(entry) = current.take() {
                            if !entry.id.contains("/api/errors") && !entry.id.is_empty() {
                                entries.push(entry);
                            }
                        }
                    }
                    "author" => in_author = false,
                    _ => {
                        if let (Some(f), Some(entry)) = (field.take(), current.as_mut()) {
                            assign(entry, f, collapse_whitespace(&text));
                        }
                        text.clear();
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::Parse(format!(
                    "arXiv feed error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
        buf.clear();
    }

    Ok(entries)
}

fn assign(entry: &mut ArxivEntry, field: Field, value: String) {
    match field {
        Field::Id => entry.id = value,
        Field::Title => entry.title = value,
        Field::Summary => entry.summary = value,
        Field::Published => entry.published = value,
        Field::Updated => entry.updated = value,
        Field::AuthorName => {
            if let Some(author) = entry.authors.last_mut() {
                author.name = value;
            }
        }
        Field::Affiliation => {
            if let Some(author) = entry.authors.last_mut() {
                author.affiliation = Some(value).filter(|v| !v.is_empty());
            }
        }
        Field::Doi => entry.doi = Some(value).filter(|v| !v.is_empty()),
        Field::JournalRef => entry.journal_ref = Some(value).filter(|v| !v.is_empty()),
        Field::Comment => entry.comment = Some(value).filter(|v| !v.is_empty()),
    }
}

fn parse_atom_date(value: &str) -> Option<NaiveDate> {
    value
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

pub(crate) fn entry_to_paper(entry: ArxivEntry) -> Paper {
    let short_id = entry
        .id
        .rsplit_once("/abs/")
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| entry.id.clone());
    let (base, version) = split_version(&short_id).unwrap_or((short_id.clone(), None));

    let mut paper = Paper::new(prefixed(SOURCE, &base), entry.title, SOURCE);
    paper.authors = entry
        .authors
        .into_iter()
        .filter(|a| !a.name.is_empty())
        .collect();
    paper.r#abstract = Some(entry.summary).filter(|s| !s.is_empty());
    paper.url = entry.abs_url.or_else(|| Some(entry.id.clone()));
    paper.pdf_url = entry.pdf_url;
    paper.publication_date = parse_atom_date(&entry.published);
    paper.journal = Some("arXiv".to_string());
    paper.doi = entry.doi;
    paper.raw_metadata = json!({
        "categories": entry.categories,
        "primary_category": entry.primary_category,
        "comment": entry.comment,
        "journal_ref": entry.journal_ref,
        "version": version,
        "updated": entry.updated,
    });
    paper
}
