use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::errors::ServiceError;
use crate::services::scan_engine::{ScanEngine, ScanOutcome, ScanSession};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScanCodeCommand {
    #[validate(length(min = 1, max = 128))]
    pub code: String,
    /// Operator already accepted exceeding the plan.
    #[serde(default)]
    pub confirmed: bool,
}

impl ScanCodeCommand {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            confirmed: false,
        }
    }

    pub fn confirmed(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            confirmed: true,
        }
    }
}

#[async_trait]
impl Command for ScanCodeCommand {
    type Result = ScanOutcome;

    #[instrument(skip(self, engine, session), fields(code = %self.code))]
    async fn execute(
        &self,
        engine: &ScanEngine,
        session: &mut ScanSession,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let code = self.code.trim();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "scan payload is blank".to_string(),
            ));
        }

        let outcome = engine.scan(session, code, self.confirmed).await?;
        info!(
            document_id = %session.document().id,
            outcome = outcome_name(&outcome),
            "scan handled"
        );
        Ok(outcome)
    }
}

fn outcome_name(outcome: &ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::CellEntered { .. } => "cell_entered",
        ScanOutcome::LineUpdated { .. } => "line_updated",
        ScanOutcome::LineCreated { .. } => "line_created",
        ScanOutcome::Coalesced { .. } => "coalesced",
    }
}
