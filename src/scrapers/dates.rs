//! Publication date resolution.
//!
//! Looks for a date in the fetched HTML, then in the URL, and returns the
//! first hit:
//!
//! 1. `<meta property="article:published_time" content="...">`
//! 2. `<meta name="date" content="...">`
//! 3. the first `<time>` element's `datetime` attribute, else its trimmed text
//! 4. a `/YYYY/MM/DD/` segment in the URL path, reassembled as `YYYY-MM-DD`
//!
//! A missing date is a normal outcome and yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static PUBLISHED_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:published_time"]"#).unwrap());
static META_DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"meta[name="date"]"#).unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static URL_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d{4})/(\d{2})/(\d{2})/").unwrap());

fn resolve_document(document: &Html, url: &str) -> Option<String> {
    meta_content(document, &PUBLISHED_TIME)
        .or_else(|| meta_content(document, &META_DATE))
        .or_else(|| time_element(document))
        .or_else(|| date_from_url(url))
}

/// Resolve the publication date from raw HTML and its URL.
pub fn resolve(html: &str, url: &str) -> Option<String> {
    resolve_document(&Html::parse_document(html), url)
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

fn time_element(document: &Html) -> Option<String> {
    let el = document.select(&TIME).next()?;
    if let Some(datetime) = el.value().attr("datetime").filter(|d| !d.is_empty()) {
        return Some(datetime.to_string());
    }
    let text = el.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Pull a `YYYY-MM-DD` date out of a `/YYYY/MM/DD/` URL path segment.
pub fn date_from_url(url: &str) -> Option<String> {
    URL_DATE
        .captures(url)
        .map(|caps| format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]))
}
