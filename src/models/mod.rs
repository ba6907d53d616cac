// Core document model
pub mod cell;
pub mod discrepancy;
pub mod document;
pub mod ids;
pub mod line;
pub mod policy;
pub mod route;

pub use cell::CellCode;
pub use discrepancy::{
    DiscrepancyKind, DiscrepancyRecord, DiscrepancyReport, DiscrepancySnapshot, DiscrepancyTag,
};
pub use document::{
    Document, DocumentDetails, DocumentStatus, DocumentType, InventoryScope, ReturnOperation,
};
pub use ids::{DocumentId, LineId};
pub use line::{Line, LineStatus, ProductRef};
pub use policy::{CellScope, PolicyOverride, ReconcilePolicy, SurplusPolicy};
pub use route::{RouteItem, RouteStep, RouteStepStatus};
