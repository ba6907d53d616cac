use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ids::{DocumentId, LineId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineStatus {
    Pending,
    Partial,
    Completed,
    Over,
}

impl LineStatus {
    /// Status implied by a fact/plan pair. Whether an `Over` result is allowed at all is a
    /// policy question answered by the reconciler, not here.
    pub fn derive(quantity_fact: u32, quantity_plan: u32) -> Self {
        if quantity_fact == 0 {
            LineStatus::Pending
        } else if quantity_fact < quantity_plan {
            LineStatus::Partial
        } else if quantity_fact == quantity_plan {
            LineStatus::Completed
        } else {
            LineStatus::Over
        }
    }

    /// Lines counted towards `Document::completed_lines`.
    pub fn is_done(&self) -> bool {
        matches!(self, LineStatus::Completed | LineStatus::Over)
    }
}

/// Product identity as printed on the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_id: String,
    pub name: String,
    pub sku: String,
    pub barcode: String,
}

impl ProductRef {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        sku: impl Into<String>,
        barcode: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            sku: sku.into(),
            barcode: barcode.into(),
        }
    }

    /// Stand-in identity for a code no catalogue entry is known for.
    pub fn unknown(code: &str) -> Self {
        Self::new(
            format!("unknown:{}", code),
            format!("Unknown item {}", code),
            code,
            code,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub document_id: DocumentId,
    pub product_id: String,
    pub product_name: String,
    pub product_sku: String,
    pub barcode: String,
    pub quantity_plan: u32,
    pub quantity_fact: u32,
    pub status: LineStatus,
    #[serde(default)]
    pub cell_id: Option<String>,
    #[serde(default)]
    pub scan_count: u32,
    #[serde(default)]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revision: u64,
}

impl Line {
    /// A line with a declared plan and nothing counted yet.
    pub fn planned(
        id: LineId,
        document_id: DocumentId,
        product: ProductRef,
        quantity_plan: u32,
        cell_id: Option<String>,
    ) -> Self {
        Self {
            id,
            document_id,
            product_id: product.product_id,
            product_name: product.name,
            product_sku: product.sku,
            barcode: product.barcode,
            quantity_plan,
            quantity_fact: 0,
            status: LineStatus::Pending,
            cell_id,
            scan_count: 0,
            last_scan_at: None,
            revision: 0,
        }
    }

    pub fn product(&self) -> ProductRef {
        ProductRef {
            product_id: self.product_id.clone(),
            name: self.product_name.clone(),
            sku: self.product_sku.clone(),
            barcode: self.barcode.clone(),
        }
    }

    /// Exact match on barcode or SKU.
    pub fn matches_code(&self, code: &str) -> bool {
        self.barcode == code || self.product_sku == code
    }

    pub fn in_cell(&self, cell: &str) -> bool {
        self.cell_id
            .as_deref()
            .map(|own| own.eq_ignore_ascii_case(cell))
            .unwrap_or(false)
    }

    /// Units still missing against the plan.
    pub fn remaining(&self) -> u32 {
        self.quantity_plan.saturating_sub(self.quantity_fact)
    }
}
