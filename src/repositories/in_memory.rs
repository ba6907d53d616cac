use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tracing::{debug, instrument};

use super::DocumentRepository;
use crate::errors::ServiceError;
use crate::models::{Document, DocumentId, DocumentType, Line};

#[derive(Debug, Default)]
struct Table {
    documents: DashMap<DocumentId, Document>,
    lines: DashMap<DocumentId, Vec<Line>>,
}

/// Process-local cache with one table per document type.
#[derive(Debug)]
pub struct InMemoryRepository {
    tables: HashMap<DocumentType, Table>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: DocumentType::iter()
                .map(|doc_type| (doc_type, Table::default()))
                .collect(),
        }
    }

    fn table(&self, doc_type: DocumentType) -> Result<&Table, ServiceError> {
        self.tables
            .get(&doc_type)
            .ok_or_else(|| ServiceError::StorageError(format!("no table for {}", doc_type)))
    }

    /// Number of cached documents of one type.
    pub fn document_count(&self, doc_type: DocumentType) -> usize {
        self.tables
            .get(&doc_type)
            .map(|table| table.documents.len())
            .unwrap_or(0)
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn get(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Option<Document>, ServiceError> {
        Ok(self
            .table(doc_type)?
            .documents
            .get(id)
            .map(|entry| entry.value().clone()))
    }

    async fn get_lines(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Vec<Line>, ServiceError> {
        Ok(self
            .table(doc_type)?
            .lines
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    #[instrument(skip(self, line), fields(line_id = %line.id, revision = line.revision))]
    async fn upsert_line(&self, doc_type: DocumentType, line: &Line) -> Result<(), ServiceError> {
        let table = self.table(doc_type)?;
        let mut lines = table.lines.entry(line.document_id.clone()).or_default();
        match lines.iter_mut().find(|stored| stored.id == line.id) {
            Some(stored) if stored.revision > line.revision => {
                debug!(stored = stored.revision, "dropping stale line write");
            }
            Some(stored) => *stored = line.clone(),
            None => lines.push(line.clone()),
        }
        Ok(())
    }

    #[instrument(skip(self, document), fields(document_id = %document.id, revision = document.revision))]
    async fn upsert_document(&self, document: &Document) -> Result<(), ServiceError> {
        let table = self.table(document.doc_type)?;
        match table.documents.get_mut(&document.id) {
            Some(stored) if stored.revision > document.revision => {
                debug!(stored = stored.revision, "dropping stale document write");
            }
            Some(mut stored) => *stored = document.clone(),
            None => {
                table.documents.insert(document.id.clone(), document.clone());
            }
        }
        Ok(())
    }

    async fn bulk_put(&self, document: &Document, lines: &[Line]) -> Result<(), ServiceError> {
        let table = self.table(document.doc_type)?;
        table
            .documents
            .insert(document.id.clone(), document.clone());
        table.lines.insert(document.id.clone(), lines.to_vec());
        Ok(())
    }
}
