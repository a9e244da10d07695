//! # sitemap2doc
//!
//! A CLI utility to turn a website's sitemap into a single document.
//!
//! Every URL listed in the sitemap (sitemap indexes are followed) is loaded
//! in one headless Chrome tab, one after another, and its content is
//! appended to the output:
//!
//! - `pdf`: each page printed to A4 and merged into one PDF
//! - `txt`: the rendered text of each page, concatenated
//! - `md`: the main content of each page converted to Markdown
//!
//! Pages that fail to load are logged and skipped.
//!
//! ## Usage
//!
//! ```bash
//! sitemap2doc https://docs.example.com/sitemap.xml docs --format md
//! ```

pub mod browser;
pub mod config;
pub mod crawler;
mod format;
pub mod markdown;
pub mod output;
mod pdf_merger;
pub mod sitemap;

pub use browser::{ChromeRenderer, PageRenderer};
pub use config::{BrowserOptions, CrawlOptions, PdfOptions};
pub use crawler::{crawl_with, default_output_name, CrawlReport, Crawler};
pub use format::{OutputFormat, PageContent};
pub use pdf_merger::PdfMerger;
