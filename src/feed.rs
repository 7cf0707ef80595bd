//! Headlines fetching: the article model and the HTTP client for the
//! top-headlines endpoint.
//!
//! The API signals failure inside the response body (`status != "ok"`), so the
//! client parses every body it receives and never treats the HTTP status line
//! as authoritative. All errors are recoverable; callers keep their previous
//! article list and re-trigger manually.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid headlines base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    /// Transport-level failure: connect error, timeout, or unreadable body.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API key would travel as a query parameter over plaintext.
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,

    /// The payload parsed but the API reported a non-ok status.
    #[error("API rejected the request ({code}): {message}")]
    Api { code: String, message: String },

    /// The API reported ok but sent no article list.
    #[error("response contained no articles")]
    NoData,

    #[error("malformed response body: {0}")]
    Decode(#[source] serde_json::Error),
}

// ============================================================================
// Category
// ============================================================================

/// Server-defined topic filter for headline selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
    #[default]
    General,
    Technology,
    Sports,
    Business,
    Science,
    Health,
}

impl Category {
    /// All categories, in presentation order.
    pub const ALL: [Category; 6] = [
        Category::General,
        Category::Technology,
        Category::Sports,
        Category::Business,
        Category::Science,
        Category::Health,
    ];

    /// The lowercase form the API expects in the `category` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Technology => "technology",
            Category::Sports => "sports",
            Category::Business => "business",
            Category::Science => "science",
            Category::Health => "health",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown category '{0}' (expected one of: general, technology, sports, business, science, health)")]
pub struct CategoryParseError(String);

impl FromStr for Category {
    type Err = CategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(Category::General),
            "technology" => Ok(Category::Technology),
            "sports" => Ok(Category::Sports),
            "business" => Ok(Category::Business),
            "science" => Ok(Category::Science),
            "health" => Ok(Category::Health),
            _ => Err(CategoryParseError(s.to_string())),
        }
    }
}

// ============================================================================
// Article Model
// ============================================================================

/// A single headline. Identity is the `url`; everything else is display data.
///
/// Immutable once fetched — refreshes replace the whole list rather than
/// patching individual articles.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub source_name: String,
    /// None when the API omitted the timestamp or sent one we cannot parse.
    /// Sorts after every dated article.
    pub published_at: Option<DateTime<Utc>>,
}

/// Sort newest-first. Stable, so equal timestamps keep their API order and
/// re-sorting an already sorted list is a no-op. Undated articles go last.
pub fn sort_by_recency(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Option<Vec<WireArticle>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArticle {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url_to_image: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    source: WireSource,
}

#[derive(Debug, Default, Deserialize)]
struct WireSource {
    #[serde(default)]
    name: Option<String>,
}

impl WireArticle {
    fn into_article(self) -> Article {
        let published_at = self.published_at.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(err) => {
                    tracing::debug!(url = %self.url, raw, error = %err, "Unparseable publish timestamp");
                    None
                }
            }
        });

        Article {
            url: self.url,
            title: self.title.unwrap_or_default(),
            description: self.description,
            image_url: self.url_to_image,
            source_name: self.source.name.unwrap_or_default(),
            published_at,
        }
    }
}

/// Parse a top-headlines response body into a recency-sorted article list.
///
/// Split out from the client so the payload handling is testable without a
/// live socket.
pub fn parse_headlines(body: &str) -> Result<Vec<Article>, FeedError> {
    let payload: HeadlinesResponse = serde_json::from_str(body).map_err(FeedError::Decode)?;

    if payload.status != "ok" {
        return Err(FeedError::Api {
            code: payload.code.unwrap_or_else(|| "unknown".to_string()),
            message: payload
                .message
                .unwrap_or_else(|| "no detail provided".to_string()),
        });
    }

    let wire = payload.articles.ok_or(FeedError::NoData)?;
    let mut articles: Vec<Article> = wire.into_iter().map(WireArticle::into_article).collect();
    sort_by_recency(&mut articles);
    Ok(articles)
}

// ============================================================================
// Headlines Client
// ============================================================================

/// Create a redirect policy with loop detection and limited hops.
fn create_redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }
        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }
        attempt.follow()
    })
}

/// HTTP client for the top-headlines endpoint.
///
/// One instance per session; `reqwest::Client` pools connections internally.
/// The API key is held as a [`SecretString`] and only ever leaves as the
/// `apiKey` query parameter.
pub struct HeadlinesClient {
    http: reqwest::Client,
    endpoint: Url,
    country: String,
    api_key: SecretString,
}

impl HeadlinesClient {
    pub fn new(
        base_url: &str,
        country: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        // Enforce HTTPS: the API key rides in the query string, so a
        // plaintext base URL would expose it on the wire. HTTP is allowed
        // only for localhost (mock servers in tests).
        if !base_url.starts_with("https://") {
            let is_localhost = base_url.starts_with("http://127.0.0.1")
                || base_url.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS base URL");
                return Err(FeedError::InsecureBaseUrl);
            }
        }

        let endpoint = Url::parse(base_url)?.join("/v2/top-headlines")?;
        let http = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            country: country.into(),
            api_key,
        })
    }

    /// Fetch top headlines for one category, sorted newest-first.
    ///
    /// Exactly one request per invocation. The HTTP status line is ignored:
    /// the API encodes failure in the body, so a 4xx body still yields the
    /// `code`/`message` pair instead of an opaque transport error.
    pub async fn top_headlines(&self, category: Category) -> Result<Vec<Article>, FeedError> {
        tracing::debug!(%category, country = %self.country, "Fetching top headlines");

        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[
                ("country", self.country.as_str()),
                ("category", category.as_str()),
                ("apiKey", self.api_key.expose_secret()),
            ])
            .send()
            .await?;

        let body = response.text().await?;
        let articles = parse_headlines(&body)?;
        tracing::info!(count = articles.len(), %category, "Headlines fetched");
        Ok(articles)
    }
}

// ============================================================================
// Tests
// ============================================================================
