use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument};

use crate::commands::Command;
use crate::errors::ServiceError;
use crate::services::scan_engine::{RouteProgress, ScanEngine, ScanSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RouteAction {
    /// Leave the current step as it is.
    Skip,
    /// Record the remaining quantity of the step as missing.
    NotInCell,
    /// Move on from a filled step.
    Next,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteActionCommand {
    pub action: RouteAction,
}

impl RouteActionCommand {
    pub fn new(action: RouteAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl Command for RouteActionCommand {
    type Result = RouteProgress;

    #[instrument(skip(self, engine, session), fields(action = %self.action))]
    async fn execute(
        &self,
        engine: &ScanEngine,
        session: &mut ScanSession,
    ) -> Result<Self::Result, ServiceError> {
        let progress = match self.action {
            RouteAction::Skip => engine.skip_step(session).await?,
            RouteAction::NotInCell => engine.not_in_cell(session).await?,
            RouteAction::Next => engine.next_step(session).await?,
        };
        info!(
            current_step = ?progress.current_step,
            complete = progress.complete,
            "route navigated"
        );
        Ok(progress)
    }
}
