use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::services::scan_engine::{ScanEngine, ScanSession};

pub mod documents;
pub mod scanning;

pub use documents::finish_document_command::FinishDocumentCommand;
pub use scanning::adjust_quantity_command::AdjustQuantityCommand;
pub use scanning::route_action_command::{RouteAction, RouteActionCommand};
pub use scanning::scan_code_command::ScanCodeCommand;

/// A validated operator action applied to one open session.
#[async_trait]
pub trait Command: Send + Sync {
    type Result: Send + Sync;

    async fn execute(
        &self,
        engine: &ScanEngine,
        session: &mut ScanSession,
    ) -> Result<Self::Result, ServiceError>;
}
