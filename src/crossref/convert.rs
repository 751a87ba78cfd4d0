//! Typed Crossref work records and the pure `CrossrefWork -> Paper` converter.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::sync::OnceLock;

use crate::error::SourceError;
use crate::models::{prefixed, Author, Paper, CROSSREF_SOURCE};

/// `{"status": "ok", "message": ...}` envelope of every Crossref response.
#[derive(Debug, Deserialize)]
pub struct CrossrefEnvelope<T> {
    pub message: T,
}

#[derive(Debug, Default, Deserialize)]
pub struct CrossrefWorkList {
    #[serde(default)]
    pub items: Vec<CrossrefWork>,
    #[serde(rename = "total-results", default)]
    pub total_results: Option<u64>,
}

/// One Crossref work. Every field is optional; `DOI` is required only at conversion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefWork {
    #[serde(rename = "DOI", default)]
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub title: Vec<String>,
    #[serde(default)]
    pub author: Vec<CrossrefAuthor>,
    #[serde(rename = "published-print", default)]
    pub published_print: Option<CrossrefDate>,
    #[serde(rename = "published-online", default)]
    pub published_online: Option<CrossrefDate>,
    #[serde(default)]
    pub issued: Option<CrossrefDate>,
    #[serde(rename = "container-title", default, deserialize_with = "string_or_seq")]
    pub container_title: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(rename = "is-referenced-by-count", default)]
    pub citation_count: Option<u64>,
    #[serde(rename = "references-count", default)]
    pub references_count: Option<u64>,
    #[serde(default)]
    pub reference: Vec<CrossrefReference>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(rename = "type", default)]
    pub work_type: Option<String>,
    #[serde(default)]
    pub subject: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefAuthor {
    #[serde(default)]
    pub given: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    /// Organizational authors carry only `name`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub affiliation: Vec<CrossrefAffiliation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefAffiliation {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefDate {
    #[serde(rename = "date-parts", default)]
    pub date_parts: Vec<Vec<Option<i32>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefReference {
    #[serde(rename = "DOI", default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub unstructured: Option<String>,
}

impl CrossrefWork {
    /// DOIs of the entries in this work's `reference` list, in order.
    pub fn reference_dois(&self) -> Vec<String> {
        self.reference
            .iter()
            .filter_map(|r| r.doi.as_deref())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Crossref sends some text fields as a list and, in older records, as a string.
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

fn jats_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("Invalid regex pattern"))
}

/// Remove JATS markup (`<jats:p>`, `<jats:italic>`...) from an abstract.
pub fn strip_jats(text: &str) -> String {
    let stripped = jats_tag().replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl CrossrefDate {
    /// First date-parts entry; missing month/day default to 1.
    fn to_date(&self) -> Option<NaiveDate> {
        let parts = self.date_parts.first()?;
        let year = (*parts.first()?)?;
        let month = parts.get(1).copied().flatten().unwrap_or(1) as u32;
        let day = parts.get(2).copied().flatten().unwrap_or(1) as u32;
        NaiveDate::from_ymd_opt(year, month, day).or_else(|| NaiveDate::from_ymd_opt(year, 1, 1))
    }
}

fn author_from(raw: &CrossrefAuthor) -> Option<Author> {
    let personal = [raw.given.as_deref(), raw.family.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let name = if personal.is_empty() {
        raw.name.as_deref().map(str::trim).unwrap_or_default().to_string()
    } else {
        personal
    };
    if name.is_empty() {
        return None;
    }
    let mut author = Author::new(name);
    author.affiliation = raw
        .affiliation
        .iter()
        .filter_map(|a| a.name.clone())
        .find(|n| !n.trim().is_empty());
    Some(author)
}

/// Convert a Crossref work into a `Paper` with id `doi:<DOI>`.
///
/// Missing optional fields are left empty; only a missing DOI is an error.
pub fn work_to_paper(work: &CrossrefWork) -> Result<Paper, SourceError> {
    let doi = work
        .doi
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| SourceError::Parse("Crossref work has no DOI".to_string()))?;

    let title = work.title.first().map(|t| t.trim().to_string()).unwrap_or_default();
    let mut paper = Paper::new(prefixed("doi", doi), title, CROSSREF_SOURCE);

    paper.authors = work.author.iter().filter_map(author_from).collect();
    paper.r#abstract = work
        .abstract_text
        .as_deref()
        .map(strip_jats)
        .filter(|a| !a.is_empty());
    paper.url = work.url.clone();
    paper.publication_date = [&work.published_print, &work.published_online, &work.issued]
        .into_iter()
        .flatten()
        .find_map(CrossrefDate::to_date);
    paper.journal = work
        .container_title
        .first()
        .map(|j| j.trim().to_string())
        .filter(|j| !j.is_empty());
    paper.doi = Some(doi.to_string());
    paper.citations_count = work.citation_count;
    paper.raw_metadata = json!({
        "publisher": work.publisher,
        "type": work.work_type,
        "subject": work.subject,
        "references_count": work.references_count,
        "reference_dois": work.reference_dois(),
    });

    Ok(paper)
}
