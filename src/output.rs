//! Accumulation of crawled pages into the final document.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::{OutputFormat, PageContent, PdfMerger};

const TEXT_SEPARATOR_WIDTH: usize = 80;
const MARKDOWN_SEPARATOR: &str = "\n\n---\n\n";

/// One output document being built up page by page, in crawl order.
pub enum OutputDocument {
    Pdf(PdfMerger),
    Text(Vec<String>),
    Markdown(Vec<String>),
}

impl OutputDocument {
    pub fn new(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Pdf => OutputDocument::Pdf(PdfMerger::new()),
            OutputFormat::Txt => OutputDocument::Text(Vec::new()),
            OutputFormat::Md => OutputDocument::Markdown(Vec::new()),
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            OutputDocument::Pdf(_) => OutputFormat::Pdf,
            OutputDocument::Text(_) => OutputFormat::Txt,
            OutputDocument::Markdown(_) => OutputFormat::Md,
        }
    }

    /// Appends one page. Content of another format is rejected.
    pub fn push(&mut self, url: &str, content: PageContent) -> Result<()> {
        match (self, content) {
            (OutputDocument::Pdf(merger), PageContent::Pdf(data)) => merger.add_bytes(url, &data),
            (OutputDocument::Text(sections), PageContent::Text { title, text }) => {
                sections.push(text_section(url, title.as_deref(), &text));
                Ok(())
            }
            (OutputDocument::Markdown(sections), PageContent::Markdown { title, markdown }) => {
                sections.push(markdown_section(url, title.as_deref(), &markdown));
                Ok(())
            }
            (document, content) => Err(anyhow!(
                "Cannot add {} content for {} to a {} document",
                content.format(),
                url,
                document.format()
            )),
        }
    }

    /// Number of pages added so far.
    pub fn len(&self) -> usize {
        match self {
            OutputDocument::Pdf(merger) => merger.document_count(),
            OutputDocument::Text(sections) | OutputDocument::Markdown(sections) => sections.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        match self {
            OutputDocument::Pdf(merger) => merger.to_bytes(),
            OutputDocument::Text(sections) => {
                let separator = format!("\n\n{}\n\n", "=".repeat(TEXT_SEPARATOR_WIDTH));
                Ok(terminated(sections.join(&separator)).into_bytes())
            }
            OutputDocument::Markdown(sections) => {
                Ok(terminated(sections.join(MARKDOWN_SEPARATOR)).into_bytes())
            }
        }
    }
}

fn text_section(url: &str, title: Option<&str>, text: &str) -> String {
    format!("{}\nURL: {}\n\n{}", heading(url, title), url, text.trim())
}

fn markdown_section(url: &str, title: Option<&str>, markdown: &str) -> String {
    format!("# {}\n\nSource: {}\n\n{}", heading(url, title), url, markdown.trim())
}

fn heading<'a>(url: &'a str, title: Option<&'a str>) -> &'a str {
    title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(url)
}

fn terminated(mut body: String) -> String {
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body
}

/// Checks that `name` is a plain file name, so the output stays inside its directory.
pub fn validate_output_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Output name must not be empty"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(anyhow!("Output name '{}' is not a file name", name));
    }
    if name.contains(['/', '\\']) || name.contains('\0') {
        return Err(anyhow!("Output name '{}' must not contain path separators", name));
    }
    Ok(())
}

/// Writes `<dir>/<name>.<ext>`, creating `dir` when needed.
pub async fn write_output(dir: &Path, name: &str, format: OutputFormat, data: &[u8]) -> Result<PathBuf> {
    validate_output_name(name)?;

    fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow!("Failed to create output directory {}: {}", dir.display(), e))?;

    let path = dir.join(format!("{}.{}", name, format.extension()));
    fs::write(&path, data)
        .await
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;

    info!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(path)
}
