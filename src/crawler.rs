use anyhow::{anyhow, Context, Result};
use colored::*;
use slug::slugify;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::browser::{ChromeRenderer, PageRenderer};
use crate::config::CrawlOptions;
use crate::output::{write_output, OutputDocument};
use crate::sitemap::fetch_sitemap;
use crate::{OutputFormat, PageContent};

/// Result of a finished crawl.
#[derive(Debug)]
pub struct CrawlReport {
    pub output_path: PathBuf,
    pub rendered: usize,
    /// URLs that failed to load or render, in crawl order.
    pub skipped: Vec<String>,
}

/// Pages gathered by [`crawl_with`] before anything is written.
pub struct CrawlOutcome {
    pub document: OutputDocument,
    pub skipped: Vec<String>,
}

pub struct Crawler {
    options: CrawlOptions,
    client: reqwest::Client,
}

impl Crawler {
    pub fn new(options: CrawlOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitemap2doc/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { options, client })
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Fetches the sitemap, renders every page in one browser tab and writes
    /// the combined document.
    pub async fn run(&self, sitemap_url: &str, output_name: &str) -> Result<CrawlReport> {
        let urls = self.sitemap_urls(sitemap_url).await?;

        let mut renderer = ChromeRenderer::launch(&self.options.browser).await?;

        self.render_all(&mut renderer, &urls, output_name).await
    }

    pub async fn sitemap_urls(&self, sitemap_url: &str) -> Result<Vec<String>> {
        info!("Fetching sitemap \"{}\"", sitemap_url.green());

        let urls = fetch_sitemap(&self.client, sitemap_url).await?.sites();

        info!("Found {} URLs in sitemap", urls.len());
        Ok(urls)
    }

    /// Renders `urls` with `renderer`, closes it, then writes the output file.
    pub async fn render_all<R: PageRenderer>(
        &self,
        renderer: &mut R,
        urls: &[String],
        output_name: &str,
    ) -> Result<CrawlReport> {
        let page_timeout = self.options.browser.page_timeout;
        let outcome = crawl_with(renderer, urls, self.options.format, page_timeout).await;

        if let Err(e) = renderer.close().await {
            warn!("{}", e);
        }

        let CrawlOutcome { document, skipped } = outcome;
        if document.is_empty() {
            return Err(anyhow!("None of the {} pages could be rendered", urls.len()));
        }

        let rendered = document.len();
        let data = document.finish()?;
        let output_path = write_output(&self.options.out_dir, output_name, self.options.format, &data).await?;

        info!(
            "{} creation complete: {} ({} pages, {} skipped)",
            self.options.format.extension().to_uppercase(),
            output_path.display().to_string().blue(),
            rendered,
            skipped.len()
        );

        Ok(CrawlReport {
            output_path,
            rendered,
            skipped,
        })
    }
}

/// Visits each URL in order, keeping what renders and skipping what fails.
///
/// Each page gets at most `page_timeout` to render; `None` waits forever.
pub async fn crawl_with<R: PageRenderer>(
    renderer: &mut R,
    urls: &[String],
    format: OutputFormat,
    page_timeout: Option<Duration>,
) -> CrawlOutcome {
    let mut document = OutputDocument::new(format);
    let mut skipped = Vec::new();

    for (i, url) in urls.iter().enumerate() {
        info!("Processing {}/{}: {}", i + 1, urls.len(), url.as_str().green());

        let added = match render_within(renderer, url, format, page_timeout).await {
            Ok(content) => document.push(url, content),
            Err(e) => Err(e),
        };

        if let Err(e) = added {
            warn!("Skipping {}: {:#}", url, e);
            skipped.push(url.clone());
        }
    }

    CrawlOutcome { document, skipped }
}

async fn render_within<R: PageRenderer>(
    renderer: &mut R,
    url: &str,
    format: OutputFormat,
    page_timeout: Option<Duration>,
) -> Result<PageContent> {
    match page_timeout {
        Some(limit) => tokio::time::timeout(limit, renderer.render(url, format))
            .await
            .map_err(|_| anyhow!("Timed out after {:.1}s rendering {}", limit.as_secs_f64(), url))?,
        None => renderer.render(url, format).await,
    }
}

/// Output file name derived from the sitemap's host, e.g. `docs-example-com`.
pub fn default_output_name(sitemap_url: &str) -> String {
    let host = Url::parse(sitemap_url)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.replace('.', "-")))
        .unwrap_or_default();

    let name = slugify(host);
    if name.is_empty() {
        "sitemap".to_string()
    } else {
        name
    }
}
