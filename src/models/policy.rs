use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::document::DocumentType;

/// What happens when a mutation would push the fact above the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SurplusPolicy {
    /// The caller must re-invoke with an explicit confirmation.
    RequireConfirmation,
    Allow,
}

/// How the active cell scopes product resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CellScope {
    /// Cells are informational only.
    None,
    /// When a cell is active, only lines assigned to it match.
    RestrictToActiveCell,
    /// A cell must be scanned before any product.
    RequireActiveCell,
}

/// Per-document-type knobs of the shared reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePolicy {
    pub surplus: SurplusPolicy,
    pub cell_scope: CellScope,
    /// Unknown codes create a zero-plan placeholder line instead of failing.
    pub blind_count: bool,
    pub auto_advance: bool,
    pub zone_filter: bool,
}

impl ReconcilePolicy {
    pub fn for_type(doc_type: DocumentType) -> Self {
        match doc_type {
            DocumentType::Receiving | DocumentType::Shipment => Self {
                surplus: SurplusPolicy::RequireConfirmation,
                cell_scope: CellScope::None,
                blind_count: false,
                auto_advance: false,
                zone_filter: false,
            },
            DocumentType::Placement => Self {
                surplus: SurplusPolicy::RequireConfirmation,
                cell_scope: CellScope::RestrictToActiveCell,
                blind_count: false,
                auto_advance: false,
                zone_filter: true,
            },
            DocumentType::Picking => Self {
                surplus: SurplusPolicy::RequireConfirmation,
                cell_scope: CellScope::RestrictToActiveCell,
                blind_count: false,
                auto_advance: true,
                zone_filter: false,
            },
            DocumentType::Return => Self {
                surplus: SurplusPolicy::Allow,
                cell_scope: CellScope::None,
                blind_count: true,
                auto_advance: false,
                zone_filter: false,
            },
            DocumentType::Inventory => Self {
                surplus: SurplusPolicy::Allow,
                cell_scope: CellScope::RequireActiveCell,
                blind_count: true,
                auto_advance: false,
                zone_filter: false,
            },
        }
    }

    pub fn with_overrides(mut self, overrides: &PolicyOverride) -> Self {
        if let Some(surplus) = overrides.surplus {
            self.surplus = surplus;
        }
        if let Some(cell_scope) = overrides.cell_scope {
            self.cell_scope = cell_scope;
        }
        if let Some(blind_count) = overrides.blind_count {
            self.blind_count = blind_count;
        }
        if let Some(auto_advance) = overrides.auto_advance {
            self.auto_advance = auto_advance;
        }
        if let Some(zone_filter) = overrides.zone_filter {
            self.zone_filter = zone_filter;
        }
        self
    }
}

/// Partial policy read from configuration; unset fields keep the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverride {
    #[serde(default)]
    pub surplus: Option<SurplusPolicy>,
    #[serde(default)]
    pub cell_scope: Option<CellScope>,
    #[serde(default)]
    pub blind_count: Option<bool>,
    #[serde(default)]
    pub auto_advance: Option<bool>,
    #[serde(default)]
    pub zone_filter: Option<bool>,
}
