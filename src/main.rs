use clap::Parser;
use colored::*;
use sitemap2doc::output::validate_output_name;
use sitemap2doc::{default_output_name, BrowserOptions, CrawlOptions, Crawler, OutputFormat};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sitemap2doc")]
#[command(about = "CLI utility to crawl every page listed in a sitemap into a single PDF, text or Markdown file")]
#[command(version)]
struct Args {
    /// URL of the sitemap (or sitemap index) to crawl
    #[arg(value_parser = parse_url)]
    sitemap_url: String,

    /// Output file name without extension (defaults to the sitemap's host)
    #[arg(value_parser = parse_output_name)]
    output_name: Option<String>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Pdf)]
    format: OutputFormat,

    /// Output directory used to save the document
    #[arg(short = 'o', long = "out-dir", default_value = "output")]
    out_dir: PathBuf,

    /// Per-page timeout in seconds (0 disables it)
    #[arg(short = 't', long = "timeout", default_value = "30.0", value_parser = parse_timeout)]
    timeout: f64,

    /// Milliseconds to wait after navigation before extracting content
    #[arg(long = "settle-ms", default_value_t = 1000)]
    settle_ms: u64,

    /// Show the browser window instead of running headless
    #[arg(long = "headed")]
    headed: bool,

    /// Path to the Chrome/Chromium executable (auto-detected otherwise)
    #[arg(long = "chrome")]
    chrome: Option<PathBuf>,
}

impl Args {
    fn crawl_options(&self) -> CrawlOptions {
        let browser = BrowserOptions {
            headless: !self.headed,
            chrome_executable: self.chrome.clone(),
            settle: Duration::from_millis(self.settle_ms),
            ..BrowserOptions::default()
        }
        .with_timeout_secs(self.timeout);

        CrawlOptions {
            format: self.format,
            out_dir: self.out_dir.clone(),
            browser,
        }
    }
}

fn parse_url(s: &str) -> Result<String, String> {
    url::Url::parse(s)
        .map(|_| s.to_string())
        .map_err(|e| format!("Invalid URL: {}", e))
}

fn parse_output_name(s: &str) -> Result<String, String> {
    validate_output_name(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if !value.is_finite() || value < 0.0 {
        return Err("Must be zero or positive number.".to_string());
    }
    Ok(value)
}

#[tokio::main]
async fn main() {
    // Set up logging with chromiumoxide errors suppressed
    let filter = EnvFilter::from_default_env()
        .add_directive("chromiumoxide::conn=off".parse().expect("static directive"))
        .add_directive("chromiumoxide::handler=off".parse().expect("static directive"))
        .add_directive("sitemap2doc=info".parse().expect("static directive"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();

    let output_name = args
        .output_name
        .clone()
        .unwrap_or_else(|| default_output_name(&args.sitemap_url));

    let result = match Crawler::new(args.crawl_options()) {
        Ok(crawler) => {
            info!(
                "Crawling into {} as {}",
                crawler.options().out_dir.display().to_string().blue(),
                crawler.options().format
            );
            crawler.run(&args.sitemap_url, &output_name).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            for url in &report.skipped {
                warn!("Skipped: {}", url);
            }
            println!("{}", report.output_path.display());
        }
        Err(e) => {
            error!("{}", format!("Error: {:#}", e).red());
            process::exit(1);
        }
    }
}
