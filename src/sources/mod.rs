//! Upstream plan sources used to seed the local cache on first load.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::{
    Document, DocumentDetails, DocumentId, DocumentType, Line, LineId, LineStatus, ProductRef,
};

pub mod demo;
pub mod json_dir;

pub use demo::DemoPlanSource;
pub use json_dir::JsonDirPlanSource;

/// One declared product of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    #[serde(default)]
    pub line_id: Option<String>,
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub sku: String,
    pub barcode: String,
    pub quantity: u32,
    #[serde(default)]
    pub cell_id: Option<String>,
}

/// Quantity already counted upstream for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedItem {
    pub barcode: String,
    pub quantity: u32,
    #[serde(default)]
    pub cell_id: Option<String>,
}

/// Normalized plan as delivered by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    #[serde(default)]
    pub details: Option<DocumentDetails>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub declared: Vec<PlanItem>,
    #[serde(default)]
    pub counted: Vec<CountedItem>,
}

impl PlanSnapshot {
    /// Builds the local document and its lines.
    ///
    /// Counted quantities are matched to declared items by barcode (and cell when given);
    /// counts with no declared item become zero-plan lines.
    pub fn hydrate(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
        now: DateTime<Utc>,
    ) -> Result<(Document, Vec<Line>), ServiceError> {
        let details = self
            .details
            .clone()
            .unwrap_or_else(|| DocumentDetails::default_for(doc_type));
        if details.document_type() != doc_type {
            return Err(ServiceError::ValidationError(format!(
                "plan for {} document {} carries {} details",
                doc_type,
                id,
                details.document_type()
            )));
        }

        let mut lines: Vec<Line> = self
            .declared
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let line_id = item
                    .line_id
                    .clone()
                    .unwrap_or_else(|| format!("{}-{}", id, index + 1));
                Line::planned(
                    LineId::new(line_id),
                    id.clone(),
                    ProductRef::new(
                        item.product_id.clone(),
                        item.name.clone(),
                        item.sku.clone(),
                        item.barcode.clone(),
                    ),
                    item.quantity,
                    item.cell_id.clone(),
                )
            })
            .collect();

        for counted in &self.counted {
            let matched = lines.iter().position(|line| {
                line.barcode == counted.barcode
                    && match counted.cell_id.as_deref() {
                        Some(cell) => line.in_cell(cell),
                        None => true,
                    }
            });
            let index = match matched {
                Some(index) => index,
                None => {
                    lines.push(Line::planned(
                        LineId::new(format!("{}-{}", id, lines.len() + 1)),
                        id.clone(),
                        ProductRef::unknown(&counted.barcode),
                        0,
                        counted.cell_id.clone(),
                    ));
                    lines.len() - 1
                }
            };
            let line = &mut lines[index];
            line.quantity_fact = line.quantity_fact.saturating_add(counted.quantity);
            line.status = LineStatus::derive(line.quantity_fact, line.quantity_plan);
        }

        let mut document = Document::new(id.clone(), details, self.created_at.unwrap_or(now));
        document.updated_at = now;
        document.recount(&lines);
        Ok((document, lines))
    }
}

/// Remote or demo provider of document plans.
#[async_trait]
pub trait PlanSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the source has no plan for this document.
    async fn fetch_plan(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Option<PlanSnapshot>, ServiceError>;
}
