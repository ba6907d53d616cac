use serde::{Deserialize, Serialize};
use strum::Display;

use crate::models::{DocumentType, LineId};

/// Hints returned with a recoverable rejection so the handheld can tell the operator what to do next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanGuidance {
    /// Names of products still waiting to be scanned in the current scope.
    #[serde(default)]
    pub expected_products: Vec<String>,
    /// Cell the operator should be standing at, when known.
    #[serde(default)]
    pub expected_cell: Option<String>,
}

impl ScanGuidance {
    pub fn products(expected_products: Vec<String>) -> Self {
        Self {
            expected_products,
            expected_cell: None,
        }
    }

    pub fn cell(expected_cell: impl Into<String>) -> Self {
        Self {
            expected_products: Vec::new(),
            expected_cell: Some(expected_cell.into()),
        }
    }
}

/// Business rules the engine refuses to break without explicit operator input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum PolicyViolation {
    #[error("line {line_id} plan of {plan} would be exceeded ({attempted}); confirmation required")]
    PlanExceeded {
        line_id: LineId,
        plan: u32,
        attempted: u32,
    },

    #[error("wrong cell {scanned}, expected {expected}")]
    WrongCell { expected: String, scanned: String },

    #[error("scan cell first")]
    ScanCellFirst { expected_cell: Option<String> },

    #[error("product {product} is not assigned to this cell")]
    WrongCellProduct {
        product: String,
        expected_cell: Option<String>,
    },

    #[error("route is already complete")]
    RouteComplete,

    #[error("step at {cell} is not filled yet")]
    StepIncomplete { cell: String },
}

impl PolicyViolation {
    pub fn guidance(&self) -> ScanGuidance {
        match self {
            PolicyViolation::WrongCell { expected, .. } => ScanGuidance::cell(expected.clone()),
            PolicyViolation::ScanCellFirst { expected_cell }
            | PolicyViolation::WrongCellProduct { expected_cell, .. } => ScanGuidance {
                expected_products: Vec::new(),
                expected_cell: expected_cell.clone(),
            },
            _ => ScanGuidance::default(),
        }
    }
}

/// Coarse category used by callers to pick a reaction (prompt, retry, abort).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Policy,
    Concurrency,
    DataUnavailable,
    State,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {message}")]
    NotFound {
        message: String,
        guidance: ScanGuidance,
    },

    #[error("Policy violation: {0}")]
    PolicyViolation(#[from] PolicyViolation),

    #[error("Duplicate scan coalesced for line {0}")]
    ConcurrencyGuard(LineId),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>, guidance: ScanGuidance) -> Self {
        ServiceError::NotFound {
            message: message.into(),
            guidance,
        }
    }

    pub fn data_unavailable(doc_type: DocumentType, id: impl std::fmt::Display) -> Self {
        ServiceError::DataUnavailable(format!(
            "no cached, remote or demo plan for {} document {}",
            doc_type, id
        ))
    }

    /// Single source of truth for error categorisation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PolicyViolation(_) => ErrorKind::Policy,
            Self::ConcurrencyGuard(_) => ErrorKind::Concurrency,
            Self::DataUnavailable(_) => ErrorKind::DataUnavailable,
            Self::InvalidStatus(_) => ErrorKind::State,
            Self::StorageError(_)
            | Self::QueueError(_)
            | Self::EventError(_)
            | Self::SerializationError(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Recoverable rejections are handed back to the operator with guidance instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Policy | ErrorKind::Concurrency
        )
    }

    pub fn guidance(&self) -> Option<ScanGuidance> {
        match self {
            Self::NotFound { guidance, .. } => Some(guidance.clone()),
            Self::PolicyViolation(violation) => Some(violation.guidance()),
            _ => None,
        }
    }
}

// Result extensions for easier error handling
pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}
