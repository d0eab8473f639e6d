//! Raw syllabus text from web pages and PDF files.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const FIRECRAWL_ENDPOINT: &str = "https://api.firecrawl.dev/v1/scrape";

pub trait PageScraper {
    fn scrape(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

fn check_scheme(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::ScrapeFailed(format!(
            "'{url}' is not an http:// or https:// URL"
        )));
    }
    Ok(())
}

fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(Duration::from_secs(60)).build()?)
}

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

/// Renders pages through the Firecrawl API as markdown.
#[derive(Clone)]
pub struct FirecrawlScraper {
    client: Client,
    api_key: String,
}

impl FirecrawlScraper {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
        })
    }
}

impl PageScraper for FirecrawlScraper {
    async fn scrape(&self, url: &str) -> Result<String> {
        check_scheme(url)?;
        let response = self
            .client
            .post(FIRECRAWL_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&ScrapeRequest {
                url,
                formats: ["markdown"],
            })
            .send()
            .await?;

        let status = response.status();
        let body: ScrapeResponse = response.json().await?;
        if !status.is_success() || !body.success {
            return Err(Error::ScrapeFailed(
                body.error
                    .unwrap_or_else(|| format!("scraper returned {status}")),
            ));
        }
        body.data
            .and_then(|data| data.markdown)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::ScrapeFailed("page rendered to no text".into()))
    }
}

/// Fetches the page directly and strips markup; used when no Firecrawl key
/// is configured.
#[derive(Debug, Clone)]
pub struct HttpScraper {
    client: Client,
}

impl HttpScraper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

impl PageScraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<String> {
        check_scheme(url)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ScrapeFailed(format!("{url} returned {status}")));
        }
        let html = response.text().await?;
        let text = html_to_text(&html);
        if text.trim().is_empty() {
            return Err(Error::ScrapeFailed(format!("{url} contained no text")));
        }
        Ok(text)
    }
}

#[derive(Clone)]
pub enum Scraper {
    Firecrawl(FirecrawlScraper),
    Http(HttpScraper),
}

impl Scraper {
    pub fn from_env() -> Result<Self> {
        match std::env::var("FIRECRAWL_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Scraper::Firecrawl(FirecrawlScraper::new(key)?)),
            _ => {
                tracing::warn!("FIRECRAWL_API_KEY not set, falling back to a plain page fetch");
                Ok(Scraper::Http(HttpScraper::new()?))
            }
        }
    }
}

impl PageScraper for Scraper {
    async fn scrape(&self, url: &str) -> Result<String> {
        match self {
            Scraper::Firecrawl(scraper) => scraper.scrape(url).await,
            Scraper::Http(scraper) => scraper.scrape(url).await,
        }
    }
}

/// Wrap width for rendered pages. Wide enough that syllabus lines stay whole.
const TEXT_WIDTH: usize = 200;

/// Visible text of an HTML document, one non-empty line per block.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn extract_pdf_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::PdfUnreadable(format!("{} does not exist", path.display())));
    }
    pdf_extract::extract_text(path)
        .map_err(|err| Error::PdfUnreadable(format!("{}: {err}", path.display())))
}
