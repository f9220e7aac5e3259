use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use super::{elements, ExtractError};

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Document text with `<script>` and `<style>` contents left out.
fn visible_text(doc: &Html) -> String {
    let mut text = String::new();
    for node in doc.tree.root().descendants() {
        let Some(t) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| matches!(el.value().name(), "script" | "style"));
        if !hidden {
            text.push_str(t);
        }
    }
    text
}

pub fn extract_word_count(doc: &Html) -> usize {
    WORD_RE.find_iter(&visible_text(doc)).count()
}

pub fn extract_count_paragraphs(doc: &Html) -> usize {
    elements(doc, "p").count()
}

/// Words per body byte. An empty body has no defined ratio.
pub fn extract_text_ratio(word_count: usize, page_size: usize) -> Result<f64, ExtractError> {
    if page_size == 0 {
        return Err(ExtractError::EmptyBody);
    }
    Ok(word_count as f64 / page_size as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_and_style_not_counted() {
        let doc = Html::parse_document(
            r#"<html><head><title>Two words</title>
               <style>body { color: red; }</style>
               <script>var hidden = "lots of words here";</script></head>
               <body><p>one two three</p><script>more hidden</script></body></html>"#,
        );
        assert_eq!(extract_word_count(&doc), 5);
    }

    #[test]
    fn words_split_on_non_word_chars() {
        let doc = Html::parse_document("<p>snake_case, hyphen-ated and 42 café!</p>");
        // snake_case | hyphen | ated | and | 42 | café
        assert_eq!(extract_word_count(&doc), 6);
    }

    #[test]
    fn paragraphs_not_headings() {
        let doc = Html::parse_document("<h2>a</h2><h2>b</h2><p>x</p>");
        assert_eq!(extract_count_paragraphs(&doc), 1);
    }

    #[test]
    fn ratio_divides_words_by_bytes() {
        assert_eq!(extract_text_ratio(25, 100).unwrap(), 0.25);
        assert_eq!(extract_text_ratio(0, 10).unwrap(), 0.0);
    }

    #[test]
    fn ratio_of_empty_body_is_an_error() {
        assert!(matches!(
            extract_text_ratio(0, 0),
            Err(ExtractError::EmptyBody)
        ));
        assert!(extract_text_ratio(10, 0).is_err());
    }
}
