//! Documentation lookup for a chosen issue.
//!
//! The issue description's first link is treated as the canonical reference. The page behind
//! it is loaded, reduced to its `<body>` markup and squeezed of insignificant whitespace so it
//! can be pasted into a prompt.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::error::AppError;
use crate::markdown::extract_text_and_links;

/// A loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub page_content: String,
    pub source: String,
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load zero or more page representations for `url`.
    async fn load(&self, url: &str) -> Result<Vec<Document>, AppError>;
}

/// Loads a single page over HTTP(S).
pub struct HttpDocumentLoader {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpDocumentLoader {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent("page-advisor")
            .build()
            .map_err(|e| AppError::DocumentationFetch(format!("failed to build client: {e}")))?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    async fn load(&self, url: &str) -> Result<Vec<Document>, AppError> {
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::DocumentationFetch(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::DocumentationFetch(format!(
                "{url} returned status {status}"
            )));
        }

        let page_content = resp
            .text()
            .await
            .map_err(|e| AppError::DocumentationFetch(format!("{url}: {e}")))?;
        if page_content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![Document {
            page_content,
            source: url.to_string(),
        }])
    }
}

/// Return the first link of an issue description.
pub fn resolve_documentation_link(description: &str) -> Result<String, AppError> {
    extract_text_and_links(description)
        .links
        .into_iter()
        .next()
        .map(|link| link.href)
        .ok_or(AppError::NoDocumentationLink)
}

/// Reduce an HTML page to compact body markup.
///
/// Blank-line runs collapse to one newline and whitespace between adjacent tags is removed.
pub fn sanitize_page(page_content: &str) -> String {
    let blank_lines = Regex::new(r"\n\s*\n").expect("valid regex");
    let between_tags = Regex::new(r">\s+<").expect("valid regex");
    let body_selector = Selector::parse("body").expect("valid selector");

    let document = Html::parse_document(page_content);
    let body = document
        .select(&body_selector)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_default();

    let collapsed = blank_lines.replace_all(&body, "\n");
    let compact = between_tags.replace_all(collapsed.trim(), "><");
    compact.trim().to_string()
}

/// Load `url` and sanitize the first page.
///
/// Pages after the first are ignored. No pages at all is reported as
/// `DocumentationFetchEmpty`, which callers may downgrade to an empty context.
pub async fn fetch_documentation(
    loader: &dyn DocumentLoader,
    url: &str,
) -> Result<String, AppError> {
    let pages = loader.load(url).await?;
    let page_count = pages.len();
    let Some(first) = pages.into_iter().next() else {
        return Err(AppError::DocumentationFetchEmpty(url.to_string()));
    };
    if page_count > 1 {
        debug!(url, discarded = page_count - 1, "using first loaded page only");
    }

    let context = sanitize_page(&first.page_content);
    info!(
        url,
        source = %first.source,
        bytes = context.len(),
        "documentation context ready"
    );
    Ok(context)
}
