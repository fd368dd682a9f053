use crate::error::{Result, ScanError};
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Title and raw anchor references of one fetched document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub title: Option<String>,
    pub links: HashSet<String>,
}

/// Retrieves pages for the crawl engine.
///
/// Implementations report failures as `Err` values; the engine records them
/// against the address and keeps crawling. Links are returned raw, exactly as
/// they appear in the document, and are normalized by the engine.
pub trait PageFetcher: Send + Sync {
    fn fetch_title(&self, address: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn fetch_links(&self, address: &str) -> impl Future<Output = Result<HashSet<String>>> + Send;

    /// Title and links in one call. Transports should override this to issue a
    /// single request per page.
    fn fetch_page(&self, address: &str) -> impl Future<Output = Result<FetchedPage>> + Send {
        async move {
            let title = self.fetch_title(address).await?;
            let links = self.fetch_links(address).await?;
            Ok(FetchedPage { title, links })
        }
    }
}

/// `PageFetcher` over HTTP: one GET per page, HTML parsed with scraper.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sitewalk/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_document(&self, address: &str) -> Result<String> {
        debug!("Fetching {}", address);

        let start = Instant::now();
        let response = self.client.get(address).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: address.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Missing content type is treated as HTML
        let is_html = content_type
            .as_ref()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(true);
        if !is_html {
            return Err(ScanError::UnsupportedContent {
                url: address.to_string(),
                content_type,
            });
        }

        let body = response.text().await?;
        debug!("Fetched {} ({} bytes in {:?})", address, body.len(), start.elapsed());
        Ok(body)
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch_title(&self, address: &str) -> Result<Option<String>> {
        let body = self.fetch_document(address).await?;
        Ok(parse_page(&body)?.title)
    }

    async fn fetch_links(&self, address: &str) -> Result<HashSet<String>> {
        let body = self.fetch_document(address).await?;
        Ok(parse_page(&body)?.links)
    }

    async fn fetch_page(&self, address: &str) -> Result<FetchedPage> {
        let body = self.fetch_document(address).await?;
        parse_page(&body)
    }
}

/// Extract the `<title>` text and every anchor `href` from an HTML document.
pub fn parse_page(html: &str) -> Result<FetchedPage> {
    let document = Html::parse_document(html);

    let title_selector =
        Selector::parse("title").map_err(|e| ScanError::ParseError(e.to_string()))?;
    let link_selector =
        Selector::parse("a[href]").map_err(|e| ScanError::ParseError(e.to_string()))?;

    let title = document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty());

    let links = document
        .select(&link_selector)
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect();

    Ok(FetchedPage { title, links })
}
