pub mod links;
pub mod meta;
pub mod text;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html};
use thiserror::Error;
use url::Url;

use crate::alerts::{derive_alerts, Alerts};
use crate::fetch::FetchedPage;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid page URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("response body is empty, text ratio is undefined")]
    EmptyBody,
}

/// Every non-alert signal for one page, in column order.
#[derive(Debug, Clone)]
pub struct PageFeatures {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub h2: Vec<String>,
    pub internal_links: BTreeSet<String>,
    pub external_links: BTreeSet<String>,
    pub count_internal_links: usize,
    pub count_external_links: usize,
    pub url_length: usize,
    pub title_length: Option<usize>,
    pub meta_description_length: Option<usize>,
    pub h1_length: Option<usize>,
    pub h2_length: Vec<usize>,
    pub count_paragraphs: usize,
    pub response_time: f64,
    pub status: u16,
    pub word_count: usize,
    pub page_size: usize,
    pub text_ratio: f64,
    pub canonical_url: Option<String>,
    pub meta_robots: Option<String>,
    pub meta_keywords: Option<String>,
    pub image_alt_attributes: Vec<Option<String>>,
    pub structured_data: Vec<Option<String>>,
    pub language_tags: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A page's features together with the alerts derived from them. Only
/// constructed through [`PageRecord::new`], so the alerts always match.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub features: PageFeatures,
    alerts: Alerts,
}

impl PageRecord {
    pub fn new(features: PageFeatures) -> Self {
        let alerts = derive_alerts(&features);
        Self { features, alerts }
    }

    pub fn alerts(&self) -> &Alerts {
        &self.alerts
    }
}

/// Every element named `tag`, in document order.
pub(crate) fn elements<'a>(
    doc: &'a Html,
    tag: &'static str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    doc.tree
        .root()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

/// Character count, `None` stays `None`.
pub fn char_length(value: Option<&str>) -> Option<usize> {
    value.map(|v| v.chars().count())
}

pub fn extract_response_time(page: &FetchedPage) -> f64 {
    page.elapsed.as_secs_f64()
}

pub fn extract_status(page: &FetchedPage) -> u16 {
    page.status
}

pub fn extract_page_size(page: &FetchedPage) -> usize {
    page.body.len()
}

/// Parse the fetched body once and derive the full record for `url`.
pub fn build_record(
    url: &str,
    page: &FetchedPage,
    timestamp: DateTime<Utc>,
) -> Result<PageRecord, ExtractError> {
    let page_url = Url::parse(url).map_err(|source| ExtractError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    let doc = Html::parse_document(&String::from_utf8_lossy(&page.body));

    let title = meta::extract_title(&doc);
    let meta_description = meta::extract_meta_description(&doc);
    let h1 = meta::extract_h1(&doc);
    let h2 = meta::extract_h2(&doc);
    let graph = links::extract_links(&doc, &page_url);
    let word_count = text::extract_word_count(&doc);
    let page_size = extract_page_size(page);

    let features = PageFeatures {
        url: url.to_string(),
        count_internal_links: graph.internal.len(),
        count_external_links: graph.external.len(),
        url_length: url.chars().count(),
        title_length: char_length(title.as_deref()),
        meta_description_length: char_length(meta_description.as_deref()),
        h1_length: char_length(h1.as_deref()),
        h2_length: h2.iter().map(|h| h.chars().count()).collect(),
        title,
        meta_description,
        h1,
        h2,
        internal_links: graph.internal,
        external_links: graph.external,
        count_paragraphs: text::extract_count_paragraphs(&doc),
        response_time: extract_response_time(page),
        status: extract_status(page),
        word_count,
        page_size,
        text_ratio: text::extract_text_ratio(word_count, page_size)?,
        canonical_url: meta::extract_canonical_url(&doc),
        meta_robots: meta::extract_meta_robots(&doc),
        meta_keywords: meta::extract_meta_keywords(&doc),
        image_alt_attributes: meta::extract_image_alt_attributes(&doc),
        structured_data: meta::extract_structured_data(&doc),
        language_tags: meta::extract_language_tags(&doc),
        timestamp,
    };

    Ok(PageRecord::new(features))
}
