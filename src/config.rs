use std::path::PathBuf;
use std::time::Duration;

use crate::OutputFormat;

/// A4 in inches, the unit Chrome's print API expects.
pub const A4_WIDTH_IN: f64 = 8.27;
pub const A4_HEIGHT_IN: f64 = 11.69;

#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub scale: f64,
    pub paper_width: f64,
    pub paper_height: f64,
    pub print_background: bool,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            paper_width: A4_WIDTH_IN,
            paper_height: A4_HEIGHT_IN,
            print_background: true,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
        }
    }
}

/// How the headless browser is launched and how long each page may take.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub window_size: (u32, u32),
    /// Upper bound for navigating to and extracting one page. `None` waits forever.
    pub page_timeout: Option<Duration>,
    /// Extra wait after navigation so late scripts and fonts can finish.
    pub settle: Duration,
    pub pdf: PdfOptions,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            window_size: (1920, 1080),
            page_timeout: Some(Duration::from_secs(30)),
            settle: Duration::from_millis(1000),
            pdf: PdfOptions::default(),
        }
    }
}

impl BrowserOptions {
    /// Maps a timeout in seconds onto `page_timeout`; zero disables it.
    pub fn with_timeout_secs(mut self, seconds: f64) -> Self {
        self.page_timeout = if seconds > 0.0 {
            Some(Duration::from_secs_f64(seconds))
        } else {
            None
        };
        self
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub format: OutputFormat,
    pub out_dir: PathBuf,
    pub browser: BrowserOptions,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pdf,
            out_dir: PathBuf::from("output"),
            browser: BrowserOptions::default(),
        }
    }
}
