use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::BrowserOptions;
use crate::markdown::{html_to_markdown, page_title};
use crate::{OutputFormat, PageContent};

const TEXT_SNAPSHOT_JS: &str = r#"
    (() => ({
        title: document.title || '',
        text: document.body ? document.body.innerText : ''
    }))()
"#;

/// Something that can turn a URL into page content.
///
/// The crawl loop only talks to this trait, so it can run against a real
/// browser or against canned pages.
#[allow(async_fn_in_trait)]
pub trait PageRenderer {
    async fn render(&mut self, url: &str, format: OutputFormat) -> Result<PageContent>;

    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TextSnapshot {
    title: String,
    text: String,
}

/// One Chrome instance with a single tab that every URL is loaded into.
pub struct ChromeRenderer {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    options: BrowserOptions,
}

impl ChromeRenderer {
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder().window_size(width, height);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to create browser config: {}", e))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(err) = h {
                    // Only log if it's not a common websocket deserialization error
                    let err_str = err.to_string();
                    if !err_str.contains("data did not match any variant")
                        && !err_str.contains("untagged enum Message")
                    {
                        error!("Browser handler error: {}", err);
                    } else {
                        debug!("Chrome protocol message ignored: {}", err);
                    }
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                browser.close().await.ok();
                handle.abort();
                return Err(anyhow!("Failed to create new page: {}", e));
            }
        };

        info!("Browser ready ({})", if options.headless { "headless" } else { "headed" });

        Ok(Self {
            browser,
            page,
            handler: handle,
            options: options.clone(),
        })
    }

    async fn render_page(&self, url: &str, format: OutputFormat) -> Result<PageContent> {
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;

        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| anyhow!("Failed to wait for navigation: {}", e))?;

        tokio::time::sleep(self.options.settle).await;

        match format {
            OutputFormat::Pdf => {
                let data = self
                    .page
                    .pdf(self.print_params())
                    .await
                    .map_err(|e| anyhow!("Failed to generate PDF: {}", e))?;
                Ok(PageContent::Pdf(data))
            }
            OutputFormat::Txt => {
                let snapshot: TextSnapshot = self
                    .page
                    .evaluate(TEXT_SNAPSHOT_JS)
                    .await
                    .map_err(|e| anyhow!("Failed to read page text: {}", e))?
                    .into_value()
                    .map_err(|e| anyhow!("Failed to parse page text: {}", e))?;

                let title = Some(snapshot.title.trim().to_string()).filter(|t| !t.is_empty());
                Ok(PageContent::Text {
                    title,
                    text: snapshot.text,
                })
            }
            OutputFormat::Md => {
                let html = self
                    .page
                    .content()
                    .await
                    .map_err(|e| anyhow!("Failed to get page content: {}", e))?;

                Ok(PageContent::Markdown {
                    title: page_title(&html),
                    markdown: html_to_markdown(&html),
                })
            }
        }
    }

    fn print_params(&self) -> PrintToPdfParams {
        let pdf = &self.options.pdf;
        PrintToPdfParams {
            scale: Some(pdf.scale),
            paper_width: Some(pdf.paper_width),
            paper_height: Some(pdf.paper_height),
            print_background: Some(pdf.print_background),
            margin_top: Some(pdf.margin_top),
            margin_right: Some(pdf.margin_right),
            margin_bottom: Some(pdf.margin_bottom),
            margin_left: Some(pdf.margin_left),
            ..Default::default()
        }
    }
}

impl PageRenderer for ChromeRenderer {
    async fn render(&mut self, url: &str, format: OutputFormat) -> Result<PageContent> {
        self.render_page(url, format).await
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to close browser: {}", e));
        self.handler.abort();
        closed
    }
}
