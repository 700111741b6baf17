//! The fetch seam: a [`Fetcher`] turns an address into a [`Document`], which the
//! process stage asks for links and body text.

use async_trait::async_trait;
use crawldex_core::Address;
use lazy_static::lazy_static;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use std::time::Duration;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

lazy_static! {
    static ref SEL_A: Selector = Selector::parse("a[href]").expect("valid selector");
    static ref SEL_BODY: Selector = Selector::parse("body").expect("valid selector");
}

/// Every variant is treated as retryable by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("content too large: {0} bytes")]
    TooLarge(usize),
    #[error("not found: {0}")]
    NotFound(String),
}

pub trait Document: Send + 'static {
    fn address(&self) -> &Address;
    /// Absolute addresses of outbound links.
    fn extract_links(&self) -> Vec<Address>;
    fn extract_text(&self) -> String;
}

#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Document: Document;

    async fn fetch(&self, address: &Address) -> Result<Self::Document, FetchError>;
}

/// Raw HTML plus the address it came from. Parsing is deferred to the
/// `extract_*` calls so it runs on the process workers, not the fetch tasks.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    address: Address,
    html: String,
}

impl HtmlDocument {
    pub fn new(address: Address, html: impl Into<String>) -> Self {
        Self { address, html: html.into() }
    }
}

impl Document for HtmlDocument {
    fn address(&self) -> &Address { &self.address }

    fn extract_links(&self) -> Vec<Address> {
        let Some(base) = self.address.to_url() else { return Vec::new() };
        let doc = Html::parse_document(&self.html);
        let mut links = Vec::new();
        for a in doc.select(&SEL_A) {
            let Some(href) = a.value().attr("href") else { continue };
            let href = href.trim();
            if href.is_empty() { continue; }
            let Ok(url) = base.join(href) else { continue };
            if let Ok(address) = Address::from_url(&url) {
                links.push(address);
            }
        }
        links
    }

    fn extract_text(&self) -> String {
        let doc = Html::parse_document(&self.html);
        let Some(body) = doc.select(&SEL_BODY).next() else { return String::new() };
        let mut text = String::new();
        for node in body.descendants() {
            let Some(t) = node.value().as_text() else { continue };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| matches!(e.name(), "script" | "style" | "noscript")))
                .unwrap_or(false);
            if !hidden {
                text.push_str(t);
                text.push(' ');
            }
        }
        text
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    type Document = HtmlDocument;

    async fn fetch(&self, address: &Address) -> Result<HtmlDocument, FetchError> {
        let resp = self.client.get(address.as_str()).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
            let ct = ct.to_str().unwrap_or_default();
            if !ct.starts_with("text/html") {
                return Err(FetchError::UnsupportedContentType(ct.to_string()));
            }
        }
        let bytes = resp.bytes().await?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(FetchError::TooLarge(bytes.len()));
        }
        Ok(HtmlDocument::new(address.clone(), String::from_utf8_lossy(&bytes)))
    }
}
