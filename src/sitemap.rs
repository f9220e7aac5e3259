use std::collections::HashSet;

use anyhow::{Context, Result};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetch::Fetch;

/// Index nesting below this depth is ignored.
const MAX_INDEX_DEPTH: usize = 5;

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("malformed sitemap XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed attribute in sitemap XML: {0}")]
    Attr(#[from] AttrError),
    #[error("unexpected root element <{0}>, expected <urlset> or <sitemapindex>")]
    UnknownRoot(String),
    #[error("document has no root element")]
    NoRoot,
    #[error("HTTP {0}")]
    Status(u16),
}

/// A parsed sitemap document.
#[derive(Debug, PartialEq)]
pub enum Sitemap {
    /// Page URLs, including alternate-language hrefs, in document order.
    UrlSet(Vec<String>),
    /// Child sitemap URLs, in document order.
    Index(Vec<String>),
}

/// Resolve a sitemap URL into the flat list of page URLs it describes.
///
/// Sitemap indexes are expanded depth-first in order of appearance. The root
/// sitemap must be readable; a child sitemap that fails to fetch or parse is
/// logged and contributes nothing. Duplicate page URLs are kept.
pub async fn collect_page_urls<F: Fetch>(fetcher: &F, sitemap_url: &str) -> Result<Vec<String>> {
    info!("Fetching sitemap: {}", sitemap_url);

    let mut pages = Vec::new();
    let mut seen = HashSet::from([sitemap_url.to_string()]);
    let mut pending: Vec<(String, usize)> = Vec::new();
    let mut sitemaps_read = 1usize;

    let root = fetch_sitemap(fetcher, sitemap_url)
        .await
        .with_context(|| format!("Failed to read sitemap {}", sitemap_url))?;
    match root {
        Sitemap::UrlSet(urls) => pages.extend(urls),
        Sitemap::Index(children) => schedule(&mut pending, &mut seen, children, 1),
    }

    while let Some((url, depth)) = pending.pop() {
        match fetch_sitemap(fetcher, &url).await {
            Ok(Sitemap::UrlSet(urls)) => {
                debug!("{} URLs in sitemap {}", urls.len(), url);
                sitemaps_read += 1;
                pages.extend(urls);
            }
            Ok(Sitemap::Index(children)) => {
                sitemaps_read += 1;
                if depth >= MAX_INDEX_DEPTH {
                    warn!(
                        "Sitemap index {} is nested too deep, ignoring {} children",
                        url,
                        children.len()
                    );
                    continue;
                }
                schedule(&mut pending, &mut seen, children, depth + 1);
            }
            Err(e) => warn!("Skipping sitemap {}: {:#}", url, e),
        }
    }

    info!("Found {} page URLs in {} sitemaps", pages.len(), sitemaps_read);
    Ok(pages)
}

/// Push unseen children so that the first child is popped first.
fn schedule(
    pending: &mut Vec<(String, usize)>,
    seen: &mut HashSet<String>,
    children: Vec<String>,
    depth: usize,
) {
    let fresh: Vec<String> = children
        .into_iter()
        .filter(|child| seen.insert(child.clone()))
        .collect();
    pending.extend(fresh.into_iter().rev().map(|child| (child, depth)));
}

async fn fetch_sitemap<F: Fetch>(fetcher: &F, url: &str) -> Result<Sitemap> {
    let page = fetcher.fetch(url).await?;
    if !page.is_success() {
        return Err(SitemapError::Status(page.status).into());
    }
    Ok(parse_sitemap(&String::from_utf8_lossy(&page.body))?)
}

const SITEMAP_NS: &[u8] = b"http://www.sitemaps.org/schemas/sitemap/0.9";
const XHTML_NS: &[u8] = b"http://www.w3.org/1999/xhtml";

#[derive(Clone, Copy, PartialEq)]
enum Root {
    UrlSet,
    Index,
}

/// Elements the walker understands. Anything else, including extension
/// elements such as `image:loc`, maps to `None`.
#[derive(Clone, Copy, PartialEq)]
enum Tag {
    UrlSet,
    SitemapIndex,
    Url,
    Sitemap,
    Loc,
    XhtmlLink,
}

fn classify(ns: &ResolveResult, local: &[u8]) -> Option<Tag> {
    let ResolveResult::Bound(Namespace(uri)) = ns else {
        return None;
    };
    if *uri == SITEMAP_NS {
        match local {
            b"urlset" => Some(Tag::UrlSet),
            b"sitemapindex" => Some(Tag::SitemapIndex),
            b"url" => Some(Tag::Url),
            b"sitemap" => Some(Tag::Sitemap),
            b"loc" => Some(Tag::Loc),
            _ => None,
        }
    } else if *uri == XHTML_NS && local == b"link" {
        Some(Tag::XhtmlLink)
    } else {
        None
    }
}

/// `{namespace}local` for bound names, the bare local name otherwise.
fn qualified(ns: &ResolveResult, local: &[u8]) -> String {
    let local = String::from_utf8_lossy(local);
    match ns {
        ResolveResult::Bound(Namespace(uri)) => {
            format!("{{{}}}{}", String::from_utf8_lossy(uri), local)
        }
        _ => local.into_owned(),
    }
}

#[derive(Default)]
struct ParseState {
    root: Option<Root>,
    in_entry: bool,
    in_loc: bool,
    loc: String,
    /// Why the current `<loc>` text could not be decoded, if it could not.
    loc_error: Option<String>,
    found: Vec<String>,
}

impl ParseState {
    fn open(&mut self, ns: &ResolveResult, e: &BytesStart) -> Result<(), SitemapError> {
        let local = e.local_name();
        let tag = classify(ns, local.as_ref());
        let Some(root) = self.root else {
            self.root = match tag {
                Some(Tag::UrlSet) => Some(Root::UrlSet),
                Some(Tag::SitemapIndex) => Some(Root::Index),
                _ => return Err(SitemapError::UnknownRoot(qualified(ns, local.as_ref()))),
            };
            return Ok(());
        };
        match (root, tag) {
            (Root::UrlSet, Some(Tag::Url)) | (Root::Index, Some(Tag::Sitemap)) => {
                self.in_entry = true
            }
            (_, Some(Tag::Loc)) if self.in_entry => {
                self.in_loc = true;
                self.loc.clear();
                self.loc_error = None;
            }
            (Root::UrlSet, Some(Tag::XhtmlLink)) if self.in_entry => {
                if let Some(href) = alternate_href(e)? {
                    self.found.push(href);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, e: &BytesText) {
        if self.loc_error.is_some() {
            return;
        }
        match e.unescape() {
            Ok(text) => self.loc.push_str(&text),
            Err(err) => {
                self.loc.push_str(&String::from_utf8_lossy(e));
                self.loc_error = Some(err.to_string());
            }
        }
    }

    fn close(&mut self, tag: Option<Tag>) {
        match tag {
            Some(Tag::Loc) if self.in_loc => {
                self.in_loc = false;
                let loc = self.loc.trim();
                if let Some(err) = self.loc_error.take() {
                    warn!("Dropping sitemap entry {:?}: {}", loc, err);
                } else if !loc.is_empty() {
                    self.found.push(loc.to_string());
                }
            }
            Some(Tag::Url) | Some(Tag::Sitemap) => self.in_entry = false,
            _ => {}
        }
    }
}

/// `href` of a `<xhtml:link rel="alternate" href="...">` annotation.
fn alternate_href(e: &BytesStart) -> Result<Option<String>, SitemapError> {
    let mut rel = None;
    let mut href = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.local_name().as_ref() {
            b"rel" => rel = Some(attr.unescape_value()?.into_owned()),
            b"href" => href = Some(attr.unescape_value()?.trim().to_string()),
            _ => {}
        }
    }
    let is_alternate = rel
        .map(|r| r.split_whitespace().any(|t| t.eq_ignore_ascii_case("alternate")))
        .unwrap_or(false);
    Ok(href.filter(|h| is_alternate && !h.is_empty()))
}

/// Parse a `<urlset>` or `<sitemapindex>` document. Sitemap elements must be
/// in the sitemaps.org namespace and alternate links in the XHTML namespace;
/// the prefixes used for them do not matter.
pub fn parse_sitemap(xml: &str) -> Result<Sitemap, SitemapError> {
    let mut reader = NsReader::from_str(xml);
    let mut state = ParseState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_resolved_event_into(&mut buf)? {
            (ns, Event::Start(e)) => state.open(&ns, &e)?,
            (ns, Event::Empty(e)) => {
                state.open(&ns, &e)?;
                state.close(classify(&ns, e.local_name().as_ref()));
            }
            (_, Event::Text(e)) if state.in_loc => state.text(&e),
            (_, Event::CData(e)) if state.in_loc => {
                state.loc.push_str(&String::from_utf8_lossy(&e.into_inner()))
            }
            (ns, Event::End(e)) => state.close(classify(&ns, e.local_name().as_ref())),
            (_, Event::Eof) => break,
            _ => {}
        }
        buf.clear();
    }

    match state.root {
        Some(Root::UrlSet) => Ok(Sitemap::UrlSet(state.found)),
        Some(Root::Index) => Ok(Sitemap::Index(state.found)),
        None => Err(SitemapError::NoRoot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MapFetcher;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
    }

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

    fn index(children: &[&str]) -> String {
        let entries: String = children
            .iter()
            .map(|l| format!("<sitemap><loc>{}</loc></sitemap>", l))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</sitemapindex>"#,
            entries
        )
    }

    #[test]
    fn urlset_with_alternates() {
        let parsed = parse_sitemap(&fixture("sitemap_urlset.xml")).unwrap();
        assert_eq!(
            parsed,
            Sitemap::UrlSet(vec![
                "https://example.com/".to_string(),
                "https://example.com/de/".to_string(),
                "https://example.com/fr/".to_string(),
                "https://example.com/about?a=1&b=2".to_string(),
            ])
        );
    }

    #[test]
    fn sitemap_index_children() {
        let parsed = parse_sitemap(&fixture("sitemap_index.xml")).unwrap();
        assert_eq!(
            parsed,
            Sitemap::Index(vec![
                "https://example.com/sitemap-pages.xml".to_string(),
                "https://example.com/sitemap-posts.xml".to_string(),
            ])
        );
    }

    #[test]
    fn unknown_root_rejected() {
        let err = parse_sitemap("<html><body>not a sitemap</body></html>").unwrap_err();
        assert!(matches!(err, SitemapError::UnknownRoot(ref r) if r == "html"));
    }

    #[test]
    fn mismatched_tags_rejected() {
        let err = parse_sitemap(
            r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"><url><loc>https://a.test/</url></loc></urlset>"#,
        );
        assert!(matches!(err, Err(SitemapError::Xml(_))));
    }

    #[test]
    fn root_outside_sitemap_namespace_rejected() {
        let err = parse_sitemap("<urlset><url><loc>https://a.test/</loc></url></urlset>")
            .unwrap_err();
        assert!(matches!(err, SitemapError::UnknownRoot(ref r) if r == "urlset"));

        let err = parse_sitemap(r#"<urlset xmlns="http://example.com/ns"></urlset>"#).unwrap_err();
        assert!(
            matches!(err, SitemapError::UnknownRoot(ref r) if r == "{http://example.com/ns}urlset")
        );
    }

    #[test]
    fn prefixed_sitemap_namespace_accepted() {
        let parsed = parse_sitemap(
            r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
                 <sm:url><sm:loc>https://a.test/p</sm:loc></sm:url>
               </sm:urlset>"#,
        )
        .unwrap();
        assert_eq!(parsed, Sitemap::UrlSet(vec!["https://a.test/p".to_string()]));
    }

    #[test]
    fn extension_elements_ignored() {
        let parsed = parse_sitemap(&fixture("sitemap_extensions.xml")).unwrap();
        assert_eq!(
            parsed,
            Sitemap::UrlSet(vec![
                "https://example.com/gallery".to_string(),
                "https://example.com/es/gallery".to_string(),
                "https://example.com/watch".to_string(),
                "https://example.com/news".to_string(),
            ])
        );
    }

    #[test]
    fn undecodable_loc_drops_only_that_entry() {
        let parsed = parse_sitemap(&urlset(&[
            "https://a.test/one",
            "https://a.test/two&nbsp;",
            "https://a.test/three",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            Sitemap::UrlSet(vec![
                "https://a.test/one".to_string(),
                "https://a.test/three".to_string(),
            ])
        );
    }

    #[test]
    fn empty_document_has_no_root() {
        assert!(matches!(parse_sitemap(""), Err(SitemapError::NoRoot)));
    }

    #[tokio::test]
    async fn index_children_walked_in_order() {
        let fetcher = MapFetcher::new()
            .with(
                "https://s.test/index.xml",
                200,
                &index(&["https://s.test/one.xml", "https://s.test/two.xml"]),
            )
            .with(
                "https://s.test/one.xml",
                200,
                &urlset(&["https://s.test/a", "https://s.test/b", "https://s.test/c"]),
            )
            .with(
                "https://s.test/two.xml",
                200,
                &urlset(&["https://s.test/d", "https://s.test/e", "https://s.test/f"]),
            );

        let urls = collect_page_urls(&fetcher, "https://s.test/index.xml").await.unwrap();
        assert_eq!(
            urls,
            vec![
                "https://s.test/a",
                "https://s.test/b",
                "https://s.test/c",
                "https://s.test/d",
                "https://s.test/e",
                "https://s.test/f",
            ]
        );
    }

    #[tokio::test]
    async fn nested_index_is_depth_first() {
        let fetcher = MapFetcher::new()
            .with(
                "https://s.test/root.xml",
                200,
                &index(&["https://s.test/nested.xml", "https://s.test/last.xml"]),
            )
            .with(
                "https://s.test/nested.xml",
                200,
                &index(&["https://s.test/inner.xml"]),
            )
            .with("https://s.test/inner.xml", 200, &urlset(&["https://s.test/1"]))
            .with("https://s.test/last.xml", 200, &urlset(&["https://s.test/2"]));

        let urls = collect_page_urls(&fetcher, "https://s.test/root.xml").await.unwrap();
        assert_eq!(urls, vec!["https://s.test/1", "https://s.test/2"]);
    }

    #[tokio::test]
    async fn broken_child_sitemap_is_skipped() {
        let fetcher = MapFetcher::new()
            .with(
                "https://s.test/index.xml",
                200,
                &index(&[
                    "https://s.test/missing.xml",
                    "https://s.test/garbage.xml",
                    "https://s.test/gone.xml",
                    "https://s.test/ok.xml",
                ]),
            )
            .with("https://s.test/garbage.xml", 200, "<urlset><url><loc>")
            .with("https://s.test/gone.xml", 404, "not found")
            .with("https://s.test/ok.xml", 200, &urlset(&["https://s.test/page"]));

        let urls = collect_page_urls(&fetcher, "https://s.test/index.xml").await.unwrap();
        assert_eq!(urls, vec!["https://s.test/page"]);
    }

    #[tokio::test]
    async fn unreadable_root_is_fatal() {
        let fetcher = MapFetcher::new();
        assert!(collect_page_urls(&fetcher, "https://s.test/none.xml").await.is_err());

        let fetcher = MapFetcher::new().with("https://s.test/bad.xml", 500, "oops");
        assert!(collect_page_urls(&fetcher, "https://s.test/bad.xml").await.is_err());
    }

    #[tokio::test]
    async fn self_referencing_index_terminates() {
        let fetcher = MapFetcher::new()
            .with(
                "https://s.test/loop.xml",
                200,
                &index(&["https://s.test/loop.xml", "https://s.test/leaf.xml"]),
            )
            .with("https://s.test/leaf.xml", 200, &urlset(&["https://s.test/x"]));

        let urls = collect_page_urls(&fetcher, "https://s.test/loop.xml").await.unwrap();
        assert_eq!(urls, vec!["https://s.test/x"]);
    }

    #[tokio::test]
    async fn duplicate_pages_are_kept() {
        let fetcher = MapFetcher::new().with(
            "https://s.test/dup.xml",
            200,
            &urlset(&["https://s.test/a", "https://s.test/a"]),
        );
        let urls = collect_page_urls(&fetcher, "https://s.test/dup.xml").await.unwrap();
        assert_eq!(urls.len(), 2);
    }
}
