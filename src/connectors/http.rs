//! Shared outbound HTTP plumbing for connectors and the Crossref client.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::config::HttpConfig;
use crate::error::SourceError;

/// Pooled HTTP client with retry on rate limits and server errors.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: usize,
    base_delay: Duration,
}

impl HttpClient {
    /// Build a client from the `[http]` config section.
    pub fn new(config: &HttpConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Override the first backoff delay (doubles on every retry).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request built by `build`, retrying 429/5xx and transport errors
    /// with exponential backoff. A 404 becomes `SourceError::NotFound(what)`.
    pub async fn send<F>(&self, what: &str, build: F) -> Result<Response, SourceError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = self.base_delay;

        loop {
            let result = match build(&self.client).send().await {
                Ok(response) => check_status(what, response).await,
                Err(e) => Err(SourceError::from(e)),
            };

            match result {
                Ok(response) => {
                    log::debug!("{} took {:?} (attempt {})", what, start.elapsed(), attempt + 1);
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    log::warn!(
                        "Retry {}/{} for {} after error: {}",
                        attempt + 1,
                        self.max_retries,
                        what,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get_text<F>(&self, what: &str, build: F) -> Result<String, SourceError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(what, build).await?;
        response.text().await.map_err(SourceError::from)
    }

    pub async fn get_json<T, F>(&self, what: &str, build: F) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let body = self.get_text(what, build).await?;
        serde_json::from_str(&body).map_err(SourceError::from)
    }

    /// Download raw bytes, returning the content type alongside.
    pub async fn get_bytes<F>(&self, what: &str, build: F) -> Result<(Vec<u8>, Option<String>), SourceError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(what, build).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await.map_err(SourceError::from)?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Download a PDF, rejecting responses that are not PDFs.
    pub async fn download_pdf(&self, what: &str, url: &str) -> Result<Vec<u8>, SourceError> {
        let (bytes, content_type) = self.get_bytes(what, |c| c.get(url)).await?;
        if !looks_like_pdf(&bytes, content_type.as_deref()) {
            return Err(SourceError::Unsupported(format!(
                "{}: response from {} is not a PDF",
                what, url
            )));
        }
        Ok(bytes)
    }
}

fn looks_like_pdf(bytes: &[u8], content_type: Option<&str>) -> bool {
    bytes.starts_with(b"%PDF")
        || content_type
            .map(|ct| ct.to_lowercase().contains("pdf"))
            .unwrap_or(false)
}

async fn check_status(what: &str, response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(what.to_string()));
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    Err(SourceError::Http {
        status: status.as_u16(),
        message: preview(&body, 200),
    })
}

/// Truncate without splitting a multi-byte UTF-8 character.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let limit = max.min(text.len());
    let safe_end = (0..=limit)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    text[..safe_end].to_string()
}

/// Append `segments` to `base`, each percent-encoded as one path segment.
///
/// DOIs contain `/` and sometimes `#` or `?`, none of which may reach the path raw.
pub fn endpoint(base: &str, segments: &[&str]) -> Result<Url, SourceError> {
    let mut url = Url::parse(base)
        .map_err(|e| SourceError::Network(format!("Invalid API URL '{}': {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| SourceError::Network(format!("API URL '{}' cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
