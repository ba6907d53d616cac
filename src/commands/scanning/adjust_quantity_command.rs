use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::{Validate, ValidationError};

use crate::commands::Command;
use crate::errors::ServiceError;
use crate::models::LineId;
use crate::services::scan_engine::{ScanEngine, ScanOutcome, ScanSession};

/// Manual quantity entry. `fill` raises the fact to the plan and ignores `delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_absolute_quantity"))]
pub struct AdjustQuantityCommand {
    pub line_id: LineId,
    #[validate(range(min = -100000, max = 100000))]
    pub delta: i64,
    #[serde(default)]
    pub absolute: bool,
    #[serde(default)]
    pub fill: bool,
    #[serde(default)]
    pub confirmed: bool,
}

fn validate_absolute_quantity(command: &AdjustQuantityCommand) -> Result<(), ValidationError> {
    if command.absolute && command.delta < 0 {
        return Err(ValidationError::new("negative_absolute_quantity"));
    }
    Ok(())
}

impl AdjustQuantityCommand {
    pub fn relative(line_id: LineId, delta: i64) -> Self {
        Self {
            line_id,
            delta,
            absolute: false,
            fill: false,
            confirmed: false,
        }
    }

    pub fn absolute(line_id: LineId, value: i64) -> Self {
        Self {
            absolute: true,
            ..Self::relative(line_id, value)
        }
    }

    pub fn fill(line_id: LineId) -> Self {
        Self {
            fill: true,
            ..Self::relative(line_id, 0)
        }
    }
}

#[async_trait]
impl Command for AdjustQuantityCommand {
    type Result = ScanOutcome;

    #[instrument(skip(self, engine, session), fields(line_id = %self.line_id))]
    async fn execute(
        &self,
        engine: &ScanEngine,
        session: &mut ScanSession,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let outcome = if self.fill {
            engine.fill_to_plan(session, &self.line_id).await?
        } else {
            engine
                .adjust(
                    session,
                    &self.line_id,
                    self.delta,
                    self.absolute,
                    self.confirmed,
                )
                .await?
        };

        info!(
            delta = self.delta,
            absolute = self.absolute,
            fill = self.fill,
            "quantity adjusted"
        );
        Ok(outcome)
    }
}
