//! Fetching and parsing of XML sitemaps.
//!
//! Both `<urlset>` documents and `<sitemapindex>` documents are understood.
//! Index files are followed depth first, so the resulting URL list keeps the
//! order in which the site lists its pages.

use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

/// How many levels of nested sitemap indexes are followed.
pub const MAX_INDEX_DEPTH: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct Sitemap {
    pub urls: Vec<SitemapUrl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapUrl {
    pub loc: String,
    pub lastmod: Option<String>,
}

impl Sitemap {
    /// Page locations in document order, first occurrence wins.
    pub fn sites(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.urls
            .iter()
            .filter(|u| seen.insert(u.loc.as_str()))
            .map(|u| u.loc.clone())
            .collect()
    }
}

/// A single sitemap document: either a list of pages or a list of sitemaps.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSitemap {
    UrlSet(Vec<SitemapUrl>),
    Index(Vec<String>),
}

/// Parses one sitemap document.
///
/// Elements are matched on their local name, so prefixed namespaces such as
/// `<sm:url>` are accepted. Only `<loc>`/`<lastmod>` that are direct children
/// of an entry count; extension elements like `<image:image><image:loc>` are
/// ignored. Entries without a `<loc>` are dropped.
pub fn parse_sitemap(xml: &str) -> Result<ParsedSitemap> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Root is depth 1, entries depth 2, their fields depth 3.
    let mut depth = 0usize;
    let mut is_index = false;
    let mut seen_root = false;
    let mut in_entry = false;
    let mut current_tag: Vec<u8> = Vec::new();
    let mut current_loc = String::new();
    let mut current_lastmod = String::new();

    let mut urls = Vec::new();
    let mut sitemaps = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let name = e.local_name();
                let name = name.as_ref();
                match depth {
                    1 => {
                        seen_root = true;
                        is_index = name == b"sitemapindex";
                    }
                    2 if name == b"url" || name == b"sitemap" => {
                        in_entry = true;
                        current_loc.clear();
                        current_lastmod.clear();
                    }
                    3 if in_entry => current_tag = name.to_vec(),
                    _ => current_tag.clear(),
                }
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 0 {
                    seen_root = true;
                    is_index = e.local_name().as_ref() == b"sitemapindex";
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| anyhow!("Invalid XML text in sitemap: {}", err))?;
                if depth == 3 {
                    collect_text(in_entry, &current_tag, text.trim(), &mut current_loc, &mut current_lastmod);
                }
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e);
                if depth == 3 {
                    collect_text(in_entry, &current_tag, text.trim(), &mut current_loc, &mut current_lastmod);
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                if depth == 2 && in_entry {
                    if !current_loc.is_empty() {
                        if name.as_ref() == b"sitemap" {
                            sitemaps.push(current_loc.clone());
                        } else {
                            urls.push(SitemapUrl {
                                loc: current_loc.clone(),
                                lastmod: (!current_lastmod.is_empty()).then(|| current_lastmod.clone()),
                            });
                        }
                    }
                    in_entry = false;
                }
                current_tag.clear();
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "XML parsing error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(anyhow!("Sitemap contains no XML elements"));
    }

    if is_index {
        Ok(ParsedSitemap::Index(sitemaps))
    } else {
        Ok(ParsedSitemap::UrlSet(urls))
    }
}

/// Downloads one sitemap document, failing on any non-2xx status.
pub async fn fetch_xml(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch sitemap {}", url))?
        .error_for_status()
        .with_context(|| format!("Sitemap request to {} was rejected", url))?;

    response
        .text()
        .await
        .with_context(|| format!("Failed to read sitemap body from {}", url))
}

/// Fetches a sitemap and every sitemap it indexes.
///
/// The top-level document must load and parse. Nested sitemaps that fail are
/// logged and skipped.
pub async fn fetch_sitemap(client: &reqwest::Client, sitemap_url: &str) -> Result<Sitemap> {
    let mut pending = vec![(sitemap_url.to_string(), 0usize)];
    let mut visited = HashSet::new();
    let mut urls = Vec::new();

    while let Some((url, depth)) = pending.pop() {
        if !visited.insert(url.clone()) {
            debug!("Sitemap {} already visited", url);
            continue;
        }

        let parsed = match fetch_xml(client, &url).await.and_then(|xml| parse_sitemap(&xml)) {
            Ok(parsed) => parsed,
            Err(e) if depth > 0 => {
                warn!("Skipping nested sitemap {}: {:#}", url, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let base = Url::parse(&url).ok();

        match parsed {
            ParsedSitemap::UrlSet(entries) => {
                debug!("Sitemap {} lists {} URLs", url, entries.len());
                for mut entry in entries {
                    match resolve_loc(base.as_ref(), &entry.loc) {
                        Some(resolved) => {
                            entry.loc = resolved;
                            urls.push(entry);
                        }
                        None => warn!("Ignoring invalid sitemap location \"{}\"", entry.loc),
                    }
                }
            }
            ParsedSitemap::Index(children) => {
                if depth >= MAX_INDEX_DEPTH {
                    warn!("Not following sitemap index {} deeper than {} levels", url, MAX_INDEX_DEPTH);
                    continue;
                }
                info!("Sitemap index {} references {} sitemaps", url, children.len());
                // Reversed so the stack pops children in document order.
                for child in children.iter().rev() {
                    if let Some(resolved) = resolve_loc(base.as_ref(), child) {
                        pending.push((resolved, depth + 1));
                    }
                }
            }
        }
    }

    if urls.is_empty() {
        return Err(anyhow!("No URLs found in sitemap {}", sitemap_url));
    }

    Ok(Sitemap { urls })
}

/// Absolute locations pass through; relative ones are joined onto the sitemap URL.
fn resolve_loc(base: Option<&Url>, loc: &str) -> Option<String> {
    if let Ok(url) = Url::parse(loc) {
        return Some(url.to_string());
    }
    base.and_then(|b| b.join(loc).ok()).map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn urlset(locs: &[&str]) -> String {
        let entries: String = locs
            .iter()
            .map(|l| format!("<url><loc>{}</loc></url>", l))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
            entries
        )
    }

    #[test]
    fn parses_urlset_with_lastmod() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/page1</loc>
    <lastmod>2024-01-01</lastmod>
  </url>
  <url>
    <loc>https://example.com/page2</loc>
  </url>
</urlset>"#;

        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(
            parsed,
            ParsedSitemap::UrlSet(vec![
                SitemapUrl {
                    loc: "https://example.com/page1".to_string(),
                    lastmod: Some("2024-01-01".to_string()),
                },
                SitemapUrl {
                    loc: "https://example.com/page2".to_string(),
                    lastmod: None,
                },
            ])
        );
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sitemap><loc>https://example.com/sitemap-docs.xml</loc></sitemap>
          <sitemap><loc>https://example.com/sitemap-blog.xml</loc><lastmod>2024-02-02</lastmod></sitemap>
        </sitemapindex>"#;

        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(
            parsed,
            ParsedSitemap::Index(vec![
                "https://example.com/sitemap-docs.xml".to_string(),
                "https://example.com/sitemap-blog.xml".to_string(),
            ])
        );
    }

    #[test]
    fn handles_prefixed_names_escapes_and_cdata() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sm:url><sm:loc>https://example.com/?a=1&amp;b=2</sm:loc></sm:url>
          <sm:url><sm:loc><![CDATA[https://example.com/cdata]]></sm:loc></sm:url>
          <sm:url><sm:loc></sm:loc></sm:url>
        </sm:urlset>"#;

        let ParsedSitemap::UrlSet(urls) = parse_sitemap(xml).unwrap() else {
            panic!("expected a urlset");
        };
        let locs: Vec<_> = urls.iter().map(|u| u.loc.as_str()).collect();
        assert_eq!(locs, ["https://example.com/?a=1&b=2", "https://example.com/cdata"]);
    }

    #[test]
    fn rejects_malformed_and_empty_documents() {
        assert!(parse_sitemap("").is_err());
        assert!(parse_sitemap("not xml at all").is_err());
        assert!(parse_sitemap("<urlset><url><loc>x</url></urlset>").is_err());
    }

    #[test]
    fn never_panics_on_garbage() {
        let inputs = [
            "<",
            "<url>",
            "<<<>>>",
            "\x00\x01\x02",
            "<urlset><url></url></urlset>",
            "<sitemapindex></sitemapindex>",
        ];
        for input in inputs {
            let _ = parse_sitemap(input);
        }
    }

    #[test]
    fn sites_drop_duplicates_keeping_order() {
        let sitemap = Sitemap {
            urls: ["https://a/1", "https://a/2", "https://a/1", "https://a/3"]
                .iter()
                .map(|l| SitemapUrl {
                    loc: l.to_string(),
                    lastmod: None,
                })
                .collect(),
        };
        assert_eq!(sitemap.sites(), ["https://a/1", "https://a/2", "https://a/3"]);
    }

    #[tokio::test]
    async fn fetches_urlset_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(urlset(&["https://example.com/a", "/relative"])),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let sitemap = fetch_sitemap(&client, &format!("{}/sitemap.xml", server.uri()))
            .await
            .unwrap();

        assert_eq!(
            sitemap.sites(),
            ["https://example.com/a".to_string(), format!("{}/relative", server.uri())]
        );
    }

    #[tokio::test]
    async fn follows_index_in_order_and_skips_broken_children() {
        let server = MockServer::start().await;
        let index = format!(
            r#"<sitemapindex>
                <sitemap><loc>{0}/first.xml</loc></sitemap>
                <sitemap><loc>{0}/missing.xml</loc></sitemap>
                <sitemap><loc>{0}/second.xml</loc></sitemap>
            </sitemapindex>"#,
            server.uri()
        );
        Mock::given(path("/index.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(path("/first.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&["https://e.com/1", "https://e.com/2"])))
            .mount(&server)
            .await;
        Mock::given(path("/second.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&["https://e.com/3"])))
            .mount(&server)
            .await;
        Mock::given(path("/missing.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let sitemap = fetch_sitemap(&client, &format!("{}/index.xml", server.uri()))
            .await
            .unwrap();

        assert_eq!(sitemap.sites(), ["https://e.com/1", "https://e.com/2", "https://e.com/3"]);
    }

    #[tokio::test]
    async fn top_level_http_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_sitemap(&client, &format!("{}/sitemap.xml", server.uri())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_urlset_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[])))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch_sitemap(&client, &format!("{}/sitemap.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No URLs found"));
    }

    fn index(locs: &[String]) -> String {
        let entries: String = locs
            .iter()
            .map(|l| format!("<sitemap><loc>{}</loc></sitemap>", l))
            .collect();
        format!("<sitemapindex>{}</sitemapindex>", entries)
    }

    async fn mount_xml(server: &MockServer, route: &str, body: String, calls: u64) {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(calls)
            .mount(server)
            .await;
    }

    #[test]
    fn ignores_extension_locations_inside_entries() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
                xmlns:image="http://www.google.com/schemas/sitemap-image/1.1"
                xmlns:video="http://www.google.com/schemas/sitemap-video/1.1">
          <url>
            <loc>https://example.com/page</loc>
            <image:image><image:loc>https://example.com/pic.jpg</image:loc></image:image>
            <lastmod>2024-03-01</lastmod>
          </url>
          <url>
            <video:video>
              <video:content_loc>https://example.com/clip.mp4</video:content_loc>
              <video:player_loc>https://example.com/player</video:player_loc>
            </video:video>
            <loc>https://example.com/video-page</loc>
          </url>
        </urlset>"#;

        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(
            parsed,
            ParsedSitemap::UrlSet(vec![
                SitemapUrl {
                    loc: "https://example.com/page".to_string(),
                    lastmod: Some("2024-03-01".to_string()),
                },
                SitemapUrl {
                    loc: "https://example.com/video-page".to_string(),
                    lastmod: None,
                },
            ])
        );
    }

    #[test]
    fn self_closing_root_is_an_empty_sitemap() {
        let urlset = r#"<?xml version="1.0"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"/>"#;
        assert_eq!(parse_sitemap(urlset).unwrap(), ParsedSitemap::UrlSet(vec![]));

        let index = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"/>"#;
        assert_eq!(parse_sitemap(index).unwrap(), ParsedSitemap::Index(vec![]));
    }

    #[tokio::test]
    async fn self_closing_urlset_reports_no_urls() {
        let server = MockServer::start().await;
        mount_xml(&server, "/sitemap.xml", "<urlset/>".to_string(), 1).await;

        let client = reqwest::Client::new();
        let err = fetch_sitemap(&client, &format!("{}/sitemap.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No URLs found"));
    }

    #[tokio::test]
    async fn index_cycles_are_fetched_once() {
        let server = MockServer::start().await;
        let uri = server.uri();
        mount_xml(
            &server,
            "/a.xml",
            index(&[format!("{}/a.xml", uri), format!("{}/b.xml", uri), format!("{}/pages.xml", uri)]),
            1,
        )
        .await;
        mount_xml(&server, "/b.xml", index(&[format!("{}/a.xml", uri), format!("{}/pages.xml", uri)]), 1).await;
        mount_xml(&server, "/pages.xml", urlset(&["https://e.com/1", "https://e.com/2"]), 1).await;

        let client = reqwest::Client::new();
        let sitemap = fetch_sitemap(&client, &format!("{}/a.xml", uri)).await.unwrap();

        assert_eq!(sitemap.urls.len(), 2);
        assert_eq!(sitemap.sites(), ["https://e.com/1", "https://e.com/2"]);
    }

    #[tokio::test]
    async fn stops_following_indexes_past_max_depth() {
        let server = MockServer::start().await;
        let uri = server.uri();
        mount_xml(&server, "/d0.xml", index(&[format!("{}/d1.xml", uri)]), 1).await;
        mount_xml(
            &server,
            "/d1.xml",
            index(&[format!("{}/d2.xml", uri), format!("{}/pages.xml", uri)]),
            1,
        )
        .await;
        mount_xml(&server, "/d2.xml", index(&[format!("{}/d3.xml", uri)]), 1).await;
        mount_xml(&server, "/d3.xml", index(&[format!("{}/d4.xml", uri)]), 1).await;
        mount_xml(&server, "/d4.xml", urlset(&["https://e.com/too-deep"]), 0).await;
        mount_xml(&server, "/pages.xml", urlset(&["https://e.com/shallow"]), 1).await;

        let client = reqwest::Client::new();
        let sitemap = fetch_sitemap(&client, &format!("{}/d0.xml", uri)).await.unwrap();

        assert_eq!(sitemap.sites(), ["https://e.com/shallow"]);
        server.verify().await;
    }
}
