use crate::sink::{ContentSink, FetchedDocument, SinkError};
use crate::storage::{DocumentRecord, SqliteStore};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Records document metadata and a body digest in the coordination store
#[derive(Clone)]
pub struct StoreSink {
    store: Arc<SqliteStore>,
}

impl StoreSink {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

/// Builds the stored record for a document
pub fn document_record(document: &FetchedDocument) -> DocumentRecord {
    DocumentRecord {
        url: document.url.to_string(),
        final_url: document.final_url.to_string(),
        status_code: document.status_code,
        content_type: document.content_type.clone(),
        body_bytes: document.body.len(),
        body_sha256: hex::encode(Sha256::digest(&document.body)),
        depth: document.depth,
        links_found: document.links_found,
        fetched_at: document.fetched_at,
    }
}

#[async_trait]
impl ContentSink for StoreSink {
    async fn accept(&self, document: &FetchedDocument) -> Result<(), SinkError> {
        self.store
            .record_document(document.session_id, &document_record(document))?;
        Ok(())
    }
}
