use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::ids::LineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscrepancyKind {
    Shortage,
    Surplus,
    Ok,
}

/// Extra context attached to a record by the workflow that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscrepancyTag {
    /// Operator reported the goods physically absent from the cell.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub line_id: LineId,
    pub product_name: String,
    pub planned: u32,
    pub actual: u32,
    pub kind: DiscrepancyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<DiscrepancyTag>,
}

impl DiscrepancyRecord {
    /// Signed difference, fact minus plan.
    pub fn difference(&self) -> i64 {
        i64::from(self.actual) - i64::from(self.planned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub records: Vec<DiscrepancyRecord>,
    pub has_discrepancy: bool,
}

/// Report frozen onto a document, typically at completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancySnapshot {
    pub taken_at: DateTime<Utc>,
    pub records: Vec<DiscrepancyRecord>,
}
