use anyhow::{anyhow, Error};
use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;

/// The document kinds a crawl can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pdf,
    Txt,
    Md,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Txt => "txt",
            OutputFormat::Md => "md",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "txt" => Ok(OutputFormat::Txt),
            "md" => Ok(OutputFormat::Md),
            other => Err(anyhow!(
                "Invalid format '{}'. Available formats: pdf, txt, md",
                other
            )),
        }
    }
}

/// What a single crawled page contributes to the final document.
#[derive(Debug, Clone, PartialEq)]
pub enum PageContent {
    Pdf(Vec<u8>),
    Text {
        title: Option<String>,
        text: String,
    },
    Markdown {
        title: Option<String>,
        markdown: String,
    },
}

impl PageContent {
    pub fn format(&self) -> OutputFormat {
        match self {
            PageContent::Pdf(_) => OutputFormat::Pdf,
            PageContent::Text { .. } => OutputFormat::Txt,
            PageContent::Markdown { .. } => OutputFormat::Md,
        }
    }
}
