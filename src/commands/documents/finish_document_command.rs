use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::commands::Command;
use crate::errors::ServiceError;
use crate::services::document_lifecycle::FinishOutcome;
use crate::services::scan_engine::{ScanEngine, ScanSession};

/// Finishes the open document. Without `force`, discrepancies are returned for
/// confirmation and nothing is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinishDocumentCommand {
    #[serde(default)]
    pub force: bool,
    /// Store a discrepancy snapshot on the document when completing with differences.
    #[serde(default)]
    pub attach_snapshot: bool,
}

impl FinishDocumentCommand {
    pub fn confirmed() -> Self {
        Self {
            force: true,
            attach_snapshot: true,
        }
    }
}

#[async_trait]
impl Command for FinishDocumentCommand {
    type Result = FinishOutcome;

    #[instrument(skip(self, engine, session), fields(document_id = %session.document().id))]
    async fn execute(
        &self,
        engine: &ScanEngine,
        session: &mut ScanSession,
    ) -> Result<Self::Result, ServiceError> {
        let outcome = engine
            .finish(session, self.force, self.attach_snapshot)
            .await?;

        match &outcome {
            FinishOutcome::NeedsConfirmation { discrepancies } => {
                warn!(count = discrepancies.len(), "finish needs confirmation");
            }
            FinishOutcome::Completed { follow_on, .. } => {
                info!(
                    follow_on = ?follow_on.as_ref().map(|doc| doc.id.to_string()),
                    "document finished"
                );
            }
        }
        Ok(outcome)
    }
}
