use crate::crawler::{is_html, page_title};
use crate::sink::{ContentSink, FetchedDocument, SinkError};
use async_trait::async_trait;

/// Reports each crawled page through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl ContentSink for LogSink {
    async fn accept(&self, document: &FetchedDocument) -> Result<(), SinkError> {
        let title = if is_html(&document.content_type) {
            page_title(&document.text())
        } else {
            None
        };

        tracing::info!(
            "Crawled {} [{}] depth {}: {} links, {} new{}",
            document.url,
            document.status_code,
            document.depth,
            document.links_found,
            document.links_enqueued,
            title.map(|t| format!(" \"{}\"", t)).unwrap_or_default()
        );
        Ok(())
    }
}
