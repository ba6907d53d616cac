use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::{PlanSnapshot, PlanSource};
use crate::errors::ServiceError;
use crate::models::{DocumentId, DocumentType};

/// Reads exported plans laid out as `<root>/<document type>/<document id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirPlanSource {
    root: PathBuf,
}

impl JsonDirPlanSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, doc_type: DocumentType, id: &DocumentId) -> PathBuf {
        self.root
            .join(doc_type.to_string())
            .join(format!("{}.json", id))
    }
}

#[async_trait]
impl PlanSource for JsonDirPlanSource {
    fn name(&self) -> &'static str {
        "json_dir"
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn fetch_plan(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Option<PlanSnapshot>, ServiceError> {
        if id.as_str().contains(['/', '\\']) || id.as_str().starts_with('.') {
            return Err(ServiceError::ValidationError(format!(
                "document id {:?} is not a valid file name",
                id.as_str()
            )));
        }

        let path = self.path_for(doc_type, id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no exported plan");
                return Ok(None);
            }
            Err(e) => {
                return Err(ServiceError::StorageError(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Some(serde_json::from_str(&raw)?))
    }
}
