use async_trait::async_trait;

use super::{CountedItem, PlanItem, PlanSnapshot, PlanSource};
use crate::errors::ServiceError;
use crate::models::{DocumentDetails, DocumentId, DocumentType};

/// Built-in demo plans, served for any id of a plan-driven document type.
#[derive(Debug, Default, Clone)]
pub struct DemoPlanSource;

impl DemoPlanSource {
    pub fn new() -> Self {
        Self
    }

    fn plan_for(doc_type: DocumentType, id: &DocumentId) -> Option<PlanSnapshot> {
        let (details, declared, counted) = match doc_type {
            DocumentType::Receiving => (
                DocumentDetails::Receiving {
                    supplier: Some("Demo Supplier".to_string()),
                },
                vec![
                    item("P-001", "Cordless drill", "4820000000011", 10, None),
                    item("P-002", "Drill bit set", "4820000000028", 5, None),
                    item("P-003", "Safety gloves", "4820000000035", 20, None),
                ],
                Vec::new(),
            ),
            DocumentType::Placement => (
                DocumentDetails::Placement {
                    source_document_id: None,
                },
                vec![
                    item("P-001", "Cordless drill", "4820000000011", 10, Some("A1-01")),
                    item("P-002", "Drill bit set", "4820000000028", 5, Some("A1-04")),
                    item("P-003", "Safety gloves", "4820000000035", 20, Some("B2-01")),
                ],
                Vec::new(),
            ),
            DocumentType::Picking => (
                DocumentDetails::Picking {
                    order_reference: Some(format!("SO-{}", id)),
                },
                vec![
                    item("P-001", "Cordless drill", "4820000000011", 2, Some("A1-01")),
                    item("P-004", "Tape measure", "4820000000042", 1, Some("A1-01")),
                    item("P-002", "Drill bit set", "4820000000028", 3, Some("A1-02")),
                    item("P-003", "Safety gloves", "4820000000035", 4, Some("B2-05")),
                ],
                Vec::new(),
            ),
            DocumentType::Shipment => (
                DocumentDetails::Shipment {
                    carrier: Some("Demo Express".to_string()),
                    ttn: Some(format!("TTN-{}", id)),
                },
                vec![
                    item("P-001", "Cordless drill", "4820000000011", 2, None),
                    item("P-004", "Tape measure", "4820000000042", 1, None),
                ],
                vec![CountedItem {
                    barcode: "4820000000042".to_string(),
                    quantity: 1,
                    cell_id: None,
                }],
            ),
            DocumentType::Return | DocumentType::Inventory => return None,
        };

        Some(PlanSnapshot {
            details: Some(details),
            created_at: None,
            declared,
            counted,
        })
    }
}

fn item(product_id: &str, name: &str, barcode: &str, quantity: u32, cell: Option<&str>) -> PlanItem {
    PlanItem {
        line_id: None,
        product_id: product_id.to_string(),
        name: name.to_string(),
        sku: product_id.to_string(),
        barcode: barcode.to_string(),
        quantity,
        cell_id: cell.map(str::to_string),
    }
}

#[async_trait]
impl PlanSource for DemoPlanSource {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn fetch_plan(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Option<PlanSnapshot>, ServiceError> {
        Ok(Self::plan_for(doc_type, id))
    }
}
