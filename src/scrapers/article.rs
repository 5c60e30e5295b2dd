//! Article body extraction.
//!
//! The article text is the concatenation of every `<p>` element's text,
//! separated by single spaces. Pages without paragraph text yield an empty
//! string, which the pipeline treats as "no article text".

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Extract the paragraph text of a fetched page.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&PARAGRAPH)
        .map(|p| p.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joins_paragraphs_with_space() {
        let html = "<html><body><h1>Title</h1><p>First <b>bold</b> part.</p><div>skip</div><p>Second.</p></body></html>";
        assert_eq!(extract_text(html), "First bold part. Second.");
    }

    #[test]
    fn test_no_paragraphs_means_no_text() {
        assert!(extract_text("<html><body><div>Only divs</div></body></html>").is_empty());
        assert!(extract_text("<p>   </p>").trim().is_empty());
        assert!(extract_text("").is_empty());
    }
}
