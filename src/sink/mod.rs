//! Content sinks: downstream consumers of fetched documents
//!
//! A worker hands every successfully fetched document to the session's
//! sink before completing the item. Sink failures are logged and never
//! fail the crawl of that item.

mod log_sink;
mod store_sink;

pub use log_sink::LogSink;
pub use store_sink::StoreSink;

use crate::storage::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors a content sink may report
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Document rejected: {0}")]
    Rejected(String),
}

/// A fetched document on its way downstream
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub session_id: i64,

    /// Normalized URL that was fetched
    pub url: Url,

    /// URL the body was served from
    pub final_url: Url,

    pub status_code: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    pub depth: u32,

    /// Raw links extracted from the body
    pub links_found: usize,

    /// Links newly claimed and enqueued because of this document
    pub links_enqueued: usize,
}

impl FetchedDocument {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Downstream collaborator receiving fetched documents
#[async_trait]
pub trait ContentSink: Send + Sync {
    async fn accept(&self, document: &FetchedDocument) -> Result<(), SinkError>;
}

/// Hands each document to several sinks in order
///
/// Every sink sees every document; the first error is reported after all
/// sinks have run.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ContentSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ContentSink>>) -> Self {
        Self { sinks }
    }

}

#[async_trait]
impl ContentSink for FanoutSink {
    async fn accept(&self, document: &FetchedDocument) -> Result<(), SinkError> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.accept(document).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
