use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::ids::LineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RouteStepStatus {
    Pending,
    Current,
    Completed,
    Skipped,
}

impl RouteStepStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, RouteStepStatus::Completed | RouteStepStatus::Skipped)
    }
}

/// Product to pick at a route step, snapshotted when the route is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteItem {
    pub line_id: LineId,
    pub product_name: String,
    pub barcode: String,
    pub sku: String,
    pub quantity_plan: u32,
}

/// One cell visit of a picking route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
    /// `None` groups lines that carry no cell assignment.
    pub cell_id: Option<String>,
    pub items: Vec<RouteItem>,
    pub status: RouteStepStatus,
}

impl RouteStep {
    pub fn contains_line(&self, line_id: &LineId) -> bool {
        self.items.iter().any(|item| &item.line_id == line_id)
    }
}
