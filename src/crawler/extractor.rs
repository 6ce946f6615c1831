//! Link extraction from fetched documents
//!
//! Extraction is a pure parse step: hrefs come back as raw strings, and
//! normalization, scoping and dedup are layered on by the crawl worker.
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `<a href="...">`
//! - `<link rel="canonical" href="...">`
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - Empty hrefs
//!
//! When the document has a `<base href>`, hrefs are resolved against it so
//! the worker's own base (the page URL) no longer applies.

use scraper::{Html, Selector};
use url::Url;

/// Capability for pulling outbound links out of a document
pub trait LinkExtractor: Send + Sync {
    /// Returns the raw link strings found in `document`
    ///
    /// # Arguments
    ///
    /// * `document` - The document text
    /// * `base_url` - URL the document was served from
    fn extract_links(&self, document: &str, base_url: &Url) -> Vec<String>;
}

/// HTML link extractor built on `scraper`
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinkExtractor;

impl LinkExtractor for HtmlLinkExtractor {
    fn extract_links(&self, document: &str, base_url: &Url) -> Vec<String> {
        let document = Html::parse_document(document);
        let base_override = document_base(&document, base_url);
        let mut links = Vec::new();

        let mut push = |href: &str| {
            let href = href.trim();
            if href.is_empty() {
                return;
            }
            match base_override.as_ref().and_then(|base| base.join(href).ok()) {
                Some(resolved) => links.push(resolved.to_string()),
                None => links.push(href.to_string()),
            }
        };

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                if let Some(href) = element.value().attr("href") {
                    push(href);
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            for element in document.select(&canonical_selector) {
                if let Some(href) = element.value().attr("href") {
                    push(href);
                }
            }
        }

        links
    }
}

/// Resolves the document's `<base href>`, if any
fn document_base(document: &Html, base_url: &Url) -> Option<Url> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    base_url.join(href.trim()).ok()
}

/// Extracts the page title from an HTML document
pub fn page_title(document: &str) -> Option<String> {
    let document = Html::parse_document(document);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Checks if a Content-Type header denotes an HTML document
pub fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}
