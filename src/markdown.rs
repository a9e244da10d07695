//! HTML to Markdown conversion for crawled pages.

use scraper::{Html, Selector};

const MAIN_CONTENT_SELECTORS: [&str; 6] = ["main", "[role=main]", "article", ".content", "#content", "body"];
const STRIPPED_ELEMENTS: &str = "script, style, noscript, template";

/// Text of the `<title>` element, if present and non-empty.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Returns the HTML of the element most likely to hold the page's content.
///
/// Scripts and styles are removed first. When no candidate matches, the
/// input is returned unchanged.
pub fn extract_main_content(html: &str) -> String {
    let mut document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse(STRIPPED_ELEMENTS) {
        let ids: Vec<_> = document.select(&selector).map(|element| element.id()).collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    for selector_str in MAIN_CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                return element.html();
            }
        }
    }

    html.to_string()
}

/// Converts a full HTML page into Markdown.
pub fn html_to_markdown(html: &str) -> String {
    let main_html = extract_main_content(html);
    collapse_blank_lines(html2md::parse_html(&main_html).trim())
}

/// Squeezes any run of blank lines down to a single blank line.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }

    out.trim_end().to_string()
}
