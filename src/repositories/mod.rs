use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::models::{Document, DocumentId, DocumentType, Line};

pub mod in_memory;

pub use in_memory::InMemoryRepository;

/// Local document cache, one logical table pair per document type.
///
/// Writes are upserts by id and must tolerate duplicates and out-of-order delivery: a write
/// carrying an older `revision` than the stored row is dropped.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Option<Document>, ServiceError>;

    async fn get_lines(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Vec<Line>, ServiceError>;

    async fn upsert_line(&self, doc_type: DocumentType, line: &Line) -> Result<(), ServiceError>;

    async fn upsert_document(&self, document: &Document) -> Result<(), ServiceError>;

    /// Initial hydration of a document and its lines.
    async fn bulk_put(&self, document: &Document, lines: &[Line]) -> Result<(), ServiceError>;
}
