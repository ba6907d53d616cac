use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::discrepancy::DiscrepancySnapshot;
use super::ids::DocumentId;
use super::line::Line;

/// The six floor workflows served by the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentType {
    Receiving,
    Placement,
    Picking,
    Shipment,
    Return,
    Inventory,
}

impl DocumentType {
    /// Plan-driven documents are hydrated from an upstream plan; the others are created on the floor.
    pub fn is_plan_driven(&self) -> bool {
        !matches!(self, DocumentType::Return | DocumentType::Inventory)
    }

    /// Document type that completing this one asks to create, if any.
    pub fn follow_on(&self) -> Option<DocumentType> {
        match self {
            DocumentType::Receiving => Some(DocumentType::Placement),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentStatus {
    New,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InventoryScope {
    Full,
    Partial,
    Cell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnOperation {
    CustomerReturn,
    SupplierReturn,
    Writeoff,
}

/// Type-specific document fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentDetails {
    Receiving {
        #[serde(default)]
        supplier: Option<String>,
    },
    Placement {
        /// Receiving document this placement was derived from.
        #[serde(default)]
        source_document_id: Option<DocumentId>,
    },
    Picking {
        #[serde(default)]
        order_reference: Option<String>,
    },
    Shipment {
        #[serde(default)]
        carrier: Option<String>,
        #[serde(default)]
        ttn: Option<String>,
    },
    Return {
        operation: ReturnOperation,
    },
    Inventory {
        scope: InventoryScope,
        #[serde(default)]
        zones: Vec<String>,
        #[serde(default)]
        cells: Vec<String>,
    },
}

impl DocumentDetails {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DocumentDetails::Receiving { .. } => DocumentType::Receiving,
            DocumentDetails::Placement { .. } => DocumentType::Placement,
            DocumentDetails::Picking { .. } => DocumentType::Picking,
            DocumentDetails::Shipment { .. } => DocumentType::Shipment,
            DocumentDetails::Return { .. } => DocumentType::Return,
            DocumentDetails::Inventory { .. } => DocumentType::Inventory,
        }
    }

    /// Minimal details for a document type, used when a plan carries none.
    pub fn default_for(doc_type: DocumentType) -> Self {
        match doc_type {
            DocumentType::Receiving => DocumentDetails::Receiving { supplier: None },
            DocumentType::Placement => DocumentDetails::Placement {
                source_document_id: None,
            },
            DocumentType::Picking => DocumentDetails::Picking {
                order_reference: None,
            },
            DocumentType::Shipment => DocumentDetails::Shipment {
                carrier: None,
                ttn: None,
            },
            DocumentType::Return => DocumentDetails::Return {
                operation: ReturnOperation::CustomerReturn,
            },
            DocumentType::Inventory => DocumentDetails::Inventory {
                scope: InventoryScope::Full,
                zones: Vec::new(),
                cells: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub total_lines: u32,
    /// Always equal to the number of lines in `completed` or `over`.
    pub completed_lines: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub details: DocumentDetails,
    #[serde(default)]
    pub discrepancy_snapshots: Vec<DiscrepancySnapshot>,
    #[serde(default)]
    pub revision: u64,
}

impl Document {
    pub fn new(id: DocumentId, details: DocumentDetails, now: DateTime<Utc>) -> Self {
        Self {
            id,
            doc_type: details.document_type(),
            status: DocumentStatus::New,
            total_lines: 0,
            completed_lines: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            details,
            discrepancy_snapshots: Vec::new(),
            revision: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }

    /// Recomputes the line counters from the authoritative line table.
    pub fn recount(&mut self, lines: &[Line]) {
        self.total_lines = lines.len() as u32;
        self.completed_lines = lines.iter().filter(|line| line.status.is_done()).count() as u32;
    }

    /// Moves a fresh document into progress. Returns true when the status changed.
    pub fn mark_started(&mut self) -> bool {
        if self.status == DocumentStatus::New {
            self.status = DocumentStatus::InProgress;
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision += 1;
    }
}
