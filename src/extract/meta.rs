use scraper::{ElementRef, Html};

use super::elements;

/// Whitespace-trimmed text of an element and all its descendants.
fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub fn extract_title(doc: &Html) -> Option<String> {
    elements(doc, "title").next().map(element_text)
}

pub fn extract_h1(doc: &Html) -> Option<String> {
    elements(doc, "h1").next().map(element_text)
}

pub fn extract_h2(doc: &Html) -> Vec<String> {
    elements(doc, "h2").map(element_text).collect()
}

/// `content` of the first `<meta name=...>` whose name is one of `names`.
fn meta_content(doc: &Html, names: &[&str]) -> Option<String> {
    elements(doc, "meta")
        .find(|el| {
            el.value()
                .attr("name")
                .map(|n| names.iter().any(|want| n.trim().eq_ignore_ascii_case(want)))
                .unwrap_or(false)
        })
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

pub fn extract_meta_description(doc: &Html) -> Option<String> {
    meta_content(doc, &["description"])
}

pub fn extract_meta_robots(doc: &Html) -> Option<String> {
    meta_content(doc, &["robots"])
}

pub fn extract_meta_keywords(doc: &Html) -> Option<String> {
    meta_content(doc, &["keyword", "keywords"])
}

pub fn extract_canonical_url(doc: &Html) -> Option<String> {
    elements(doc, "link")
        .find(|el| {
            el.value()
                .attr("rel")
                .map(|rel| {
                    rel.split_whitespace()
                        .any(|t| t.eq_ignore_ascii_case("canonical"))
                })
                .unwrap_or(false)
        })
        .and_then(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string())
}

/// One entry per `<img>`, `None` where the `alt` attribute is missing.
pub fn extract_image_alt_attributes(doc: &Html) -> Vec<Option<String>> {
    elements(doc, "img")
        .map(|img| img.value().attr("alt").map(str::to_string))
        .collect()
}

/// Raw body of every JSON-LD script, `None` for empty ones.
pub fn extract_structured_data(doc: &Html) -> Vec<Option<String>> {
    elements(doc, "script")
        .filter(|el| {
            el.value()
                .attr("type")
                .map(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
                .unwrap_or(false)
        })
        .map(|el| {
            let raw: String = el.text().collect();
            if raw.is_empty() {
                None
            } else {
                Some(raw)
            }
        })
        .collect()
}

pub fn extract_language_tags(doc: &Html) -> Option<String> {
    doc.root_element().value().attr("lang").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn missing_tags_are_none() {
        let d = doc("<html><body><p>plain</p></body></html>");
        assert_eq!(extract_title(&d), None);
        assert_eq!(extract_h1(&d), None);
        assert!(extract_h2(&d).is_empty());
        assert_eq!(extract_meta_description(&d), None);
        assert_eq!(extract_meta_robots(&d), None);
        assert_eq!(extract_meta_keywords(&d), None);
        assert_eq!(extract_canonical_url(&d), None);
        assert_eq!(extract_language_tags(&d), None);
        assert!(extract_image_alt_attributes(&d).is_empty());
        assert!(extract_structured_data(&d).is_empty());
    }

    #[test]
    fn first_meta_match_wins() {
        let d = doc(
            r#"<head>
                <meta name="Description" content="first">
                <meta name="description" content="second">
                <meta name="robots" content="index, follow">
                <meta name="keywords" content="a, b">
            </head>"#,
        );
        assert_eq!(extract_meta_description(&d).as_deref(), Some("first"));
        assert_eq!(extract_meta_robots(&d).as_deref(), Some("index, follow"));
        assert_eq!(extract_meta_keywords(&d).as_deref(), Some("a, b"));
    }

    #[test]
    fn meta_without_content_is_none() {
        let d = doc(r#"<head><meta name="description"></head>"#);
        assert_eq!(extract_meta_description(&d), None);
    }

    #[test]
    fn canonical_rel_token_match() {
        let d = doc(
            r#"<head>
                <link rel="stylesheet" href="/a.css">
                <link rel="Canonical nofollow" href=" https://example.com/page ">
            </head>"#,
        );
        assert_eq!(
            extract_canonical_url(&d).as_deref(),
            Some("https://example.com/page")
        );
    }

    #[test]
    fn image_alts_keep_order_and_gaps() {
        let d = doc(r#"<body><img src="a" alt="one"><img src="b"><img src="c" alt=""></body>"#);
        assert_eq!(
            extract_image_alt_attributes(&d),
            vec![Some("one".to_string()), None, Some(String::new())]
        );
    }

    #[test]
    fn json_ld_blocks() {
        let d = doc(
            r#"<head>
                <script type="application/ld+json">{"@type":"Organization"}</script>
                <script type="text/javascript">var x = 1;</script>
                <script type="application/ld+json"></script>
            </head>"#,
        );
        assert_eq!(
            extract_structured_data(&d),
            vec![Some(r#"{"@type":"Organization"}"#.to_string()), None]
        );
    }

    #[test]
    fn headings_trimmed_in_order() {
        let d = doc("<body><h1> Main <em>title</em> </h1><h2>B</h2><h2>\n A \n</h2></body>");
        assert_eq!(extract_h1(&d).as_deref(), Some("Main title"));
        assert_eq!(extract_h2(&d), vec!["B", "A"]);
    }
}
