use std::collections::BTreeSet;

use scraper::Html;
use tracing::debug;
use url::Url;

use super::elements;

/// Anchors of one page, resolved to absolute URLs and split by host.
#[derive(Debug, Default)]
pub struct LinkGraph {
    pub internal: BTreeSet<String>,
    pub external: BTreeSet<String>,
}

/// Resolve every `<a href>` against the document base and partition the
/// results by whether their host matches the page's host.
pub fn extract_links(doc: &Html, page_url: &Url) -> LinkGraph {
    let base = document_base(doc, page_url);
    let page_host = page_url.host_str();
    let mut graph = LinkGraph::default();

    for href in elements(doc, "a").filter_map(|a| a.value().attr("href")) {
        let resolved = match base.join(href.trim()) {
            Ok(u) => u,
            Err(e) => {
                debug!("Unresolvable href {:?} on {}: {}", href, page_url, e);
                continue;
            }
        };
        if resolved.host_str() == page_host {
            graph.internal.insert(resolved.into());
        } else {
            graph.external.insert(resolved.into());
        }
    }

    graph
}

/// `<base href>` if present and resolvable, otherwise the page URL.
fn document_base(doc: &Html, page_url: &Url) -> Url {
    elements(doc, "base")
        .find_map(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}
