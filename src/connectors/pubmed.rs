//! PubMed connector over NCBI E-utilities (esearch JSON, efetch XML, elink JSON).

use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use serde_json::json;

use super::http::HttpClient;
use super::xml::{attr, collapse_whitespace, expand_reference, tag_name};
use super::Connector;
use crate::error::SourceError;
use crate::models::{prefixed, Author, Paper, SearchQuery, SortBy};

const SOURCE: &str = "pubmed";
const EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PubMed connector
pub struct PubMedConnector {
    http: HttpClient,
    base_url: String,
    email: String,
    tool: String,
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ELinkResponse {
    #[serde(default)]
    linksets: Vec<ELinkSet>,
}

#[derive(Debug, Deserialize)]
struct ELinkSet {
    #[serde(default)]
    linksetdbs: Vec<ELinkSetDb>,
}

#[derive(Debug, Deserialize)]
struct ELinkSetDb {
    linkname: String,
    #[serde(default)]
    links: Vec<String>,
}

impl PubMedConnector {
    pub fn new(http: HttpClient, email: String, tool: String) -> Self {
        Self {
            http,
            base_url: EUTILS_URL.to_string(),
            email,
            tool,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}.fcgi", self.base_url.trim_end_matches('/'), name)
    }

    /// Parameters NCBI asks every client to send.
    fn etiquette(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", self.tool.clone())];
        if !self.email.is_empty() {
            params.push(("email", self.email.clone()));
        }
        params
    }

    async fn fetch_articles(&self, pmids: &[String]) -> Result<Vec<Paper>, SourceError> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        params.extend(self.etiquette());

        let url = self.endpoint("efetch");
        let body = self
            .http
            .get_text("pubmed efetch", |c| c.get(&url).query(&params))
            .await?;
        Ok(parse_articles(&body)?.into_iter().map(article_to_paper).collect())
    }

    /// PMC id linked to a PMID, if the article is in PubMed Central.
    async fn pmc_id(&self, pmid: &str) -> Result<Option<String>, SourceError> {
        let mut params = vec![
            ("dbfrom", "pubmed".to_string()),
            ("db", "pmc".to_string()),
            ("id", pmid.to_string()),
            ("linkname", "pubmed_pmc".to_string()),
            ("retmode", "json".to_string()),
        ];
        params.extend(self.etiquette());

        let url = self.endpoint("elink");
        let response: ELinkResponse = self
            .http
            .get_json("pubmed elink", |c| c.get(&url).query(&params))
            .await?;

        Ok(response
            .linksets
            .into_iter()
            .flat_map(|set| set.linksetdbs)
            .find(|db| db.linkname == "pubmed_pmc")
            .and_then(|db| db.links.into_iter().next()))
    }
}

#[async_trait]
impl Connector for PubMedConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Paper>, SourceError> {
        let sort = match query.sort_by {
            SortBy::Date => "pub_date",
            SortBy::Relevance | SortBy::Citations => "relevance",
        };
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.query.clone()),
            ("retmax", query.max_results.to_string()),
            ("retmode", "json".to_string()),
            ("sort", sort.to_string()),
        ];
        params.extend(self.etiquette());

        let url = self.endpoint("esearch");
        let response: ESearchResponse = self
            .http
            .get_json("pubmed esearch", |c| c.get(&url).query(&params))
            .await?;

        let mut papers = self.fetch_articles(&response.esearchresult.idlist).await?;
        papers.truncate(query.max_results);
        Ok(papers)
    }

    async fn get_metadata(&self, paper_id: &str) -> Result<Paper, SourceError> {
        let normalized = self.parse_id(paper_id);
        let pmid = normalized.strip_prefix("pubmed:").unwrap_or(&normalized).to_string();
        self.fetch_articles(std::slice::from_ref(&pmid))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(prefixed(SOURCE, &pmid)))
    }

    async fn download_full_text(&self, paper_id: &str) -> Result<Vec<u8>, SourceError> {
        let paper = self.get_metadata(paper_id).await?;
        let pmid = paper.paper_id.strip_prefix("pubmed:").unwrap_or(&paper.paper_id).to_string();

        if let Some(doi) = &paper.doi {
            let url = format!("https://doi.org/{}", doi);
            match self.http.download_pdf("pubmed doi redirect", &url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => log::debug!("DOI redirect for {} gave no PDF: {}", pmid, e),
            }
        }

        let pmc = match paper.raw_metadata["pmc_id"].as_str() {
            Some(id) => Some(id.trim_start_matches("PMC").to_string()),
            None => self.pmc_id(&pmid).await?,
        };
        if let Some(pmc) = pmc {
            let url = format!("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC{}/pdf/", pmc);
            match self.http.download_pdf("pmc pdf", &url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => log::debug!("PMC download for {} failed: {}", pmid, e),
            }
        }

        Err(SourceError::Unsupported(format!(
            "Could not find accessible full text for PubMed ID {}",
            pmid
        )))
    }

    fn parse_id(&self, external_id: &str) -> String {
        let trimmed = external_id.trim();

        if let Some((prefix, rest)) = trimmed.split_once(':') {
            if prefix.eq_ignore_ascii_case(SOURCE) {
                let rest = rest.trim();
                return if is_pmid(rest) {
                    prefixed(SOURCE, rest)
                } else {
                    external_id.to_string()
                };
            }
        }

        if trimmed.contains("pubmed.ncbi.nlm.nih.gov") || trimmed.contains("ncbi.nlm.nih.gov/pubmed") {
            if let Some(pmid) = trimmed.split(['/', '?', '#']).find(|part| is_pmid(part)) {
                return prefixed(SOURCE, pmid);
            }
        }

        if is_pmid(trimmed) {
            return prefixed(SOURCE, trimmed);
        }

        external_id.to_string()
    }
}

fn is_pmid(s: &str) -> bool {
    !s.is_empty() && s.len() <= 9 && s.bytes().all(|b| b.is_ascii_digit())
}

/// One `<PubmedArticle>` reduced to the fields we keep.
#[derive(Debug, Default, Clone)]
pub(crate) struct PubmedArticle {
    pub pmid: String,
    pub title: String,
    pub abstract_parts: Vec<String>,
    pub authors: Vec<Author>,
    pub journal_title: Option<String>,
    pub journal_abbrev: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub medline_date: Option<String>,
    pub doi: Option<String>,
    pub pmc_id: Option<String>,
    pub mesh_terms: Vec<String>,
    pub keywords: Vec<String>,
    pub publication_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Capture {
    Pmid,
    Title,
    Abstract,
    LastName,
    ForeName,
    CollectiveName,
    Affiliation,
    JournalTitle,
    JournalAbbrev,
    Year,
    Month,
    Day,
    MedlineDate,
    Doi,
    Pmc,
    Mesh,
    Keyword,
    PublicationType,
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

/// Decide what an opening tag captures given the path including that tag.
fn capture_for(path: &[String], id_type: Option<&str>) -> Option<Capture> {
    let tag = path.last()?.as_str();
    let in_pub_date = ends_with(&path[..path.len() - 1], &["JournalIssue", "PubDate"]);
    match tag {
        "PMID" if ends_with(path, &["MedlineCitation", "PMID"]) => Some(Capture::Pmid),
        "ArticleTitle" => Some(Capture::Title),
        "AbstractText" => Some(Capture::Abstract),
        "LastName" => Some(Capture::LastName),
        "ForeName" => Some(Capture::ForeName),
        "CollectiveName" => Some(Capture::CollectiveName),
        "Affiliation" => Some(Capture::Affiliation),
        "Title" if ends_with(path, &["Journal", "Title"]) => Some(Capture::JournalTitle),
        "ISOAbbreviation" => Some(Capture::JournalAbbrev),
        "Year" if in_pub_date => Some(Capture::Year),
        "Month" if in_pub_date => Some(Capture::Month),
        "Day" if in_pub_date => Some(Capture::Day),
        "MedlineDate" if in_pub_date => Some(Capture::MedlineDate),
        "ELocationID" if id_type == Some("doi") && ends_with(path, &["Article", "ELocationID"]) => {
            Some(Capture::Doi)
        }
        // Reference lists carry ArticleIdList too; only the article's own list counts.
        "ArticleId" if ends_with(path, &["PubmedData", "ArticleIdList", "ArticleId"]) => match id_type {
            Some("doi") => Some(Capture::Doi),
            Some("pmc") => Some(Capture::Pmc),
            _ => None,
        },
        "DescriptorName" => Some(Capture::Mesh),
        "Keyword" => Some(Capture::Keyword),
        "PublicationType" => Some(Capture::PublicationType),
        _ => None,
    }
}

/// Parse an efetch `PubmedArticleSet` document.
pub(crate) fn parse_articles(xml: &str) -> Result<Vec<PubmedArticle>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut articles = Vec::new();
    let mut current: Option<PubmedArticle> = None;
    let mut path: Vec<String> = Vec::new();
    // Capture target and the path depth it started at; inline markup nests inside.
    let mut capture: Option<(Capture, usize)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = tag_name(&e);
                path.push(name.clone());
                if name == "PubmedArticle" {
                    current = Some(PubmedArticle::default());
                } else if name == "Author" {
                    if let Some(article) = current.as_mut() {
                        article.authors.push(Author::new(String::new()));
                    }
                } else if capture.is_none() && current.is_some() {
                    let id_type = attr(&e, "EIdType").or_else(|| attr(&e, "IdType"));
                    if let Some(target) = capture_for(&path, id_type.as_deref()) {
                        capture = Some((target, path.len()));
                        text.clear();
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if capture.is_some() {
                    let raw: &[u8] = &r;
                    text.push_str(&expand_reference(raw));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if let Some((target, depth)) = capture.clone() {
                    if depth == path.len() {
                        if let Some(article) = current.as_mut() {
                            assign(article, target, collapse_whitespace(&text));
                        }
                        capture = None;
                        text.clear();
                    }
                }
                if name == "PubmedArticle" {
                    if let Some(article) = current.take() {
                        if !article.pmid.is_empty() {
                            articles.push(article);
                        }
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::Parse(format!(
                    "PubMed XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
        buf.clear();
    }

    Ok(articles)
}

fn assign(article: &mut PubmedArticle, target: Capture, value: String) {
    if value.is_empty() {
        return;
    }
    match target {
        Capture::Pmid => article.pmid = value,
        Capture::Title => article.title = value,
        Capture::Abstract => article.abstract_parts.push(value),
        Capture::LastName | Capture::CollectiveName => {
            if let Some(author) = article.authors.last_mut() {
                author.name = if author.name.is_empty() {
                    value
                } else {
                    format!("{} {}", author.name, value)
                };
            }
        }
        Capture::ForeName => {
            if let Some(author) = article.authors.last_mut() {
                author.name = if author.name.is_empty() {
                    value
                } else {
                    format!("{} {}", value, author.name)
                };
            }
        }
        Capture::Affiliation => {
            if let Some(author) = article.authors.last_mut() {
                if author.affiliation.is_none() {
                    author.affiliation = Some(value);
                }
            }
        }
        Capture::JournalTitle => article.journal_title = Some(value),
        Capture::JournalAbbrev => article.journal_abbrev = Some(value),
        Capture::Year => article.year = Some(value),
        Capture::Month => article.month = Some(value),
        Capture::Day => article.day = Some(value),
        Capture::MedlineDate => article.medline_date = Some(value),
        Capture::Doi => {
            if article.doi.is_none() {
                article.doi = Some(value);
            }
        }
        Capture::Pmc => {
            if article.pmc_id.is_none() {
                article.pmc_id = Some(value);
            }
        }
        Capture::Mesh => article.mesh_terms.push(value),
        Capture::Keyword => article.keywords.push(value),
        Capture::PublicationType => article.publication_types.push(value),
    }
}

fn month_number(month: &str) -> Option<u32> {
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = month.to_lowercase();
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

/// Publication date from `PubDate`; missing month/day default to 1.
fn publication_date(article: &PubmedArticle) -> Option<NaiveDate> {
    let year = article
        .year
        .as_deref()
        .or_else(|| article.medline_date.as_deref().and_then(|d| d.get(..4)))?
        .parse::<i32>()
        .ok()?;
    let month = article.month.as_deref().and_then(month_number).unwrap_or(1);
    let day = article
        .day
        .as_deref()
        .and_then(|d| d.parse::<u32>().ok())
        .unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
}

pub(crate) fn article_to_paper(article: PubmedArticle) -> Paper {
    let publication_date = publication_date(&article);
    let mut paper = Paper::new(prefixed(SOURCE, &article.pmid), article.title, SOURCE);
    paper.authors = article
        .authors
        .into_iter()
        .filter(|a| !a.name.is_empty())
        .collect();
    if !article.abstract_parts.is_empty() {
        paper.r#abstract = Some(article.abstract_parts.join("\n"));
    }
    paper.url = Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", article.pmid));
    paper.publication_date = publication_date;
    paper.journal = article.journal_abbrev.or(article.journal_title);
    paper.doi = article.doi;
    paper.raw_metadata = json!({
        "mesh_terms": article.mesh_terms,
        "publication_types": article.publication_types,
        "keywords": article.keywords,
        "pmc_id": article.pmc_id,
    });
    paper
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;

    const EFETCH: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">31452104</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2019</Year><Month>Aug</Month><Day>26</Day></PubDate>
          </JournalIssue>
          <Title>Nature methods</Title>
          <ISOAbbreviation>Nat Methods</ISOAbbreviation>
        </Journal>
        <ArticleTitle>Mapping <i>citation</i> networks &amp; more.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Citations matter.</AbstractText>
          <AbstractText Label="RESULTS">Graphs help.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y">
            <LastName>Curie</LastName>
            <ForeName>Marie</ForeName>
            <AffiliationInfo><Affiliation>Sorbonne</Affiliation></AffiliationInfo>
          </Author>
          <Author ValidYN="Y">
            <CollectiveName>The Graph Consortium</CollectiveName>
          </Author>
        </AuthorList>
        <ELocationID EIdType="doi" ValidYN="Y">10.1038/s41592-019-0001-x</ELocationID>
        <PublicationTypeList>
          <PublicationType UI="D016428">Journal Article</PublicationType>
        </PublicationTypeList>
      </Article>
      <MeshHeadingList>
        <MeshHeading><DescriptorName UI="D1">Bibliometrics</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <CommentsCorrectionsList>
        <CommentsCorrections RefType="Cites"><PMID Version="1">11111111</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">31452104</ArticleId>
        <ArticleId IdType="pmc">PMC6789</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

    fn connector() -> PubMedConnector {
        PubMedConnector::new(
            HttpClient::new(&HttpConfig::default()).unwrap(),
            "dev@example.org".to_string(),
            "citegraph".to_string(),
        )
    }

    #[test]
    fn test_parse_articles() {
        let articles = parse_articles(EFETCH).unwrap();
        assert_eq!(articles.len(), 1);
        let paper = article_to_paper(articles[0].clone());

        assert_eq!(paper.paper_id, "pubmed:31452104");
        assert_eq!(paper.title, "Mapping citation networks & more.");
        assert_eq!(paper.r#abstract.as_deref(), Some("Citations matter.\nGraphs help."));
        assert_eq!(paper.author_names(), vec!["Marie Curie", "The Graph Consortium"]);
        assert_eq!(paper.authors[0].affiliation.as_deref(), Some("Sorbonne"));
        assert_eq!(paper.journal.as_deref(), Some("Nat Methods"));
        assert_eq!(paper.doi.as_deref(), Some("10.1038/s41592-019-0001-x"));
        assert_eq!(paper.publication_date, NaiveDate::from_ymd_opt(2019, 8, 26));
        assert_eq!(paper.url.as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/31452104/"));
        assert_eq!(paper.raw_metadata["pmc_id"], "PMC6789");
        assert_eq!(paper.raw_metadata["mesh_terms"][0], "Bibliometrics");
        assert_eq!(paper.raw_metadata["publication_types"][0], "Journal Article");
    }

    #[test]
    fn test_reference_list_ids_are_ignored() {
        let xml = r#"<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">22222222</PMID>
      <Article>
        <ArticleTitle>Own ids only</ArticleTitle>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">22222222</ArticleId>
        <ArticleId IdType="pmc">PMC100</ArticleId>
      </ArticleIdList>
      <ReferenceList>
        <Reference>
          <Citation>Someone Else. A cited paper. 2001.</Citation>
          <ArticleIdList>
            <ArticleId IdType="doi">10.9999/someone.else</ArticleId>
            <ArticleId IdType="pmc">PMC999</ArticleId>
          </ArticleIdList>
        </Reference>
      </ReferenceList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;
        let articles = parse_articles(xml).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].pmid, "22222222");
        assert_eq!(articles[0].doi, None);
        assert_eq!(articles[0].pmc_id.as_deref(), Some("PMC100"));
    }

    #[test]
    fn test_medline_date_fallback() {
        let article = PubmedArticle {
            pmid: "1".to_string(),
            medline_date: Some("1998 Dec-1999 Jan".to_string()),
            ..Default::default()
        };
        assert_eq!(publication_date(&article), NaiveDate::from_ymd_opt(1998, 1, 1));
    }

    #[test]
    fn test_month_number() {
        assert_eq!(month_number("Aug"), Some(8));
        assert_eq!(month_number("12"), Some(12));
        assert_eq!(month_number("13"), None);
        assert_eq!(month_number("Spring"), None);
    }

    #[test]
    fn test_parse_id() {
        let c = connector();
        assert_eq!(c.parse_id("31452104"), "pubmed:31452104");
        assert_eq!(c.parse_id("pubmed:31452104"), "pubmed:31452104");
        assert_eq!(c.parse_id("PubMed:31452104"), "pubmed:31452104");
        assert_eq!(c.parse_id("https://pubmed.ncbi.nlm.nih.gov/31452104/"), "pubmed:31452104");
        assert_eq!(c.parse_id("2104.08935"), "2104.08935");
        assert_eq!(c.parse_id("doi:10.1/xyz"), "doi:10.1/xyz");
        assert_eq!(c.parse_id(""), "");
    }

    #[test]
    fn test_elink_response_shape() {
        let body = r#"{"linksets":[{"dbfrom":"pubmed","ids":["1"],"linksetdbs":[{"dbto":"pmc","linkname":"pubmed_pmc","links":["6789"]}]}]}"#;
        let parsed: ELinkResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.linksets[0].linksetdbs[0].links, vec!["6789"]);
    }
}
