use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    DiscrepancyRecord, DiscrepancyReport, DiscrepancySnapshot, DiscrepancyTag, Document,
    DocumentDetails, DocumentId, DocumentStatus, DocumentType, Line, LineId,
};
use crate::repositories::DocumentRepository;
use crate::services::collaborators::EngineContext;
use crate::services::discrepancy;
use crate::sources::PlanSource;
use crate::sync_queue::{SyncActionType, SyncQueue};

/// A document together with its authoritative line table.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub lines: Vec<Line>,
    /// `cache`, or the name of the plan source that seeded it.
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinishOutcome {
    /// Discrepancies exist and the caller did not force completion. Nothing was changed.
    NeedsConfirmation {
        discrepancies: Vec<DiscrepancyRecord>,
    },
    Completed {
        document: Document,
        report: DiscrepancyReport,
        follow_on: Option<Document>,
    },
}

impl FinishOutcome {
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, FinishOutcome::NeedsConfirmation { .. })
    }
}

/// Load, create and finish transitions plus persistence of committed changes.
#[derive(Clone)]
pub struct DocumentLifecycle {
    repository: Arc<dyn DocumentRepository>,
    sources: Vec<Arc<dyn PlanSource>>,
    sync_queue: Arc<dyn SyncQueue>,
    event_sender: EventSender,
    ctx: EngineContext,
    auto_create_follow_on: bool,
}

impl DocumentLifecycle {
    /// `sources` are tried in order after the local cache, typically remote then demo.
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        sources: Vec<Arc<dyn PlanSource>>,
        sync_queue: Arc<dyn SyncQueue>,
        event_sender: EventSender,
        ctx: EngineContext,
        auto_create_follow_on: bool,
    ) -> Self {
        Self {
            repository,
            sources,
            sync_queue,
            event_sender,
            ctx,
            auto_create_follow_on,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub(crate) fn emit(&self, event: Event) {
        self.event_sender.send_or_log(event);
    }

    /// Loads a document from the local cache, else seeds it from the first plan source that
    /// has it.
    #[instrument(skip(self))]
    pub async fn load(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<LoadedDocument, ServiceError> {
        match self.repository.get(doc_type, id).await {
            Ok(Some(document)) => {
                let lines = self.repository.get_lines(doc_type, id).await?;
                debug!(lines = lines.len(), "loaded from cache");
                return Ok(LoadedDocument {
                    document,
                    lines,
                    origin: "cache".to_string(),
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cache read failed, trying plan sources"),
        }

        for source in &self.sources {
            let snapshot = match source.fetch_plan(doc_type, id).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "plan source failed");
                    continue;
                }
            };

            let (document, lines) = snapshot.hydrate(doc_type, id, self.ctx.clock.now_utc())?;
            if let Err(e) = self.repository.bulk_put(&document, &lines).await {
                warn!(error = %e, "failed to cache hydrated document");
            }
            info!(source = source.name(), lines = lines.len(), "document hydrated");
            self.emit(Event::DocumentHydrated {
                doc_type,
                document_id: id.clone(),
                source: source.name().to_string(),
                lines: lines.len(),
            });

            return Ok(LoadedDocument {
                document,
                lines,
                origin: source.name().to_string(),
            });
        }

        Err(ServiceError::data_unavailable(doc_type, id))
    }

    /// Operator-initiated document with empty counters.
    #[instrument(skip(self))]
    pub async fn create(&self, details: DocumentDetails) -> Result<LoadedDocument, ServiceError> {
        let document = Document::new(DocumentId::generate(), details, self.ctx.clock.now_utc());
        if let Err(e) = self.repository.bulk_put(&document, &[]).await {
            warn!(error = %e, "failed to cache new document");
        }
        info!(document_id = %document.id, doc_type = %document.doc_type, "document created");
        self.emit(Event::DocumentCreated {
            doc_type: document.doc_type,
            document_id: document.id.clone(),
        });

        Ok(LoadedDocument {
            document,
            lines: Vec::new(),
            origin: "created".to_string(),
        })
    }

    /// Writes a committed line change through and queues it for sync. Failures are logged;
    /// the caller's in-memory state stays authoritative.
    pub async fn persist_line(&self, document: &Document, line: &Line) {
        if let Err(e) = self.repository.upsert_line(document.doc_type, line).await {
            warn!(line_id = %line.id, error = %e, "failed to persist line");
        }
        if let Err(e) = self.repository.upsert_document(document).await {
            warn!(document_id = %document.id, error = %e, "failed to persist document");
        }
        let payload = json!({
            "doc_type": document.doc_type,
            "document_id": document.id,
            "line": line,
        });
        if let Err(e) = self
            .sync_queue
            .enqueue(SyncActionType::UpdateLine, payload)
            .await
        {
            warn!(line_id = %line.id, error = %e, "failed to queue line update");
        }
    }

    /// Completes a document unless it has discrepancies and `force` is off.
    ///
    /// `missing` marks lines reported through the route's "not in cell" action.
    #[instrument(skip(self, document, lines, missing), fields(document_id = %document.id))]
    pub async fn finish(
        &self,
        document: &mut Document,
        lines: &[Line],
        force: bool,
        attach_snapshot: bool,
        missing: &[DiscrepancyRecord],
    ) -> Result<FinishOutcome, ServiceError> {
        let report = tagged_report(lines, missing);

        if document.is_completed() {
            debug!("document already completed, returning previous result");
            return Ok(FinishOutcome::Completed {
                document: document.clone(),
                report,
                follow_on: None,
            });
        }

        if report.has_discrepancy && !force {
            return Ok(FinishOutcome::NeedsConfirmation {
                discrepancies: report.records,
            });
        }

        let now = self.ctx.clock.now_utc();
        document.recount(lines);
        document.status = DocumentStatus::Completed;
        document.completed_at = Some(now);
        if attach_snapshot && report.has_discrepancy {
            document.discrepancy_snapshots.push(DiscrepancySnapshot {
                taken_at: now,
                records: report.records.clone(),
            });
        }
        document.touch(now);

        if let Err(e) = self.repository.upsert_document(document).await {
            warn!(error = %e, "failed to persist completed document");
        }
        let payload = json!({
            "doc_type": document.doc_type,
            "document_id": document.id,
            "report": report,
        });
        if let Err(e) = self
            .sync_queue
            .enqueue(SyncActionType::CompleteDoc, payload)
            .await
        {
            warn!(error = %e, "failed to queue document completion");
        }

        let kinds: Vec<_> = report.records.iter().map(|record| record.kind).collect();
        self.ctx.metrics.document_completed(document.doc_type, &kinds);
        info!(
            doc_type = %document.doc_type,
            discrepancies = report.records.len(),
            forced = force && report.has_discrepancy,
            "document completed"
        );
        self.emit(Event::DocumentCompleted {
            doc_type: document.doc_type,
            document_id: document.id.clone(),
            status: document.status,
            report: report.clone(),
            completed_at: now,
        });

        let follow_on = if self.auto_create_follow_on {
            self.create_follow_on(document, lines).await
        } else {
            None
        };

        Ok(FinishOutcome::Completed {
            document: document.clone(),
            report,
            follow_on,
        })
    }

    /// Records the current discrepancies on a document, completed or not.
    #[instrument(skip(self, document, lines), fields(document_id = %document.id))]
    pub async fn append_snapshot(&self, document: &mut Document, lines: &[Line]) -> DiscrepancySnapshot {
        let now = self.ctx.clock.now_utc();
        let snapshot = DiscrepancySnapshot {
            taken_at: now,
            records: discrepancy::report(lines).records,
        };
        document.discrepancy_snapshots.push(snapshot.clone());
        document.touch(now);
        if let Err(e) = self.repository.upsert_document(document).await {
            warn!(error = %e, "failed to persist discrepancy snapshot");
        }
        snapshot
    }

    async fn create_follow_on(&self, document: &Document, lines: &[Line]) -> Option<Document> {
        let (follow_on, follow_lines) = derive_follow_on(document, lines, self.ctx.clock.now_utc())?;
        if let Err(e) = self.repository.bulk_put(&follow_on, &follow_lines).await {
            warn!(error = %e, "failed to store follow-on document");
        }
        info!(target_id = %follow_on.id, target_type = %follow_on.doc_type, "follow-on document created");
        self.emit(Event::FollowOnRequested {
            source_type: document.doc_type,
            source_id: document.id.clone(),
            target_type: follow_on.doc_type,
            target_id: follow_on.id.clone(),
        });
        Some(follow_on)
    }
}

fn tagged_report(lines: &[Line], missing: &[DiscrepancyRecord]) -> DiscrepancyReport {
    let missing: HashSet<&LineId> = missing.iter().map(|record| &record.line_id).collect();
    let mut report = discrepancy::report(lines);
    for record in &mut report.records {
        if missing.contains(&record.line_id) {
            record.tag = Some(DiscrepancyTag::Missing);
        }
    }
    report
}

/// Derives the dependent document a completed one asks for.
///
/// Receiving produces a placement whose plans are the received facts. Lines with nothing
/// received are left out and every new line starts uncounted. The id is derived from the
/// source id so repeated requests land on the same document.
pub fn derive_follow_on(
    source: &Document,
    lines: &[Line],
    now: chrono::DateTime<chrono::Utc>,
) -> Option<(Document, Vec<Line>)> {
    let target = source.doc_type.follow_on()?;
    let id = DocumentId::new(format!("{}-{}", source.id, target));

    let details = match target {
        DocumentType::Placement => DocumentDetails::Placement {
            source_document_id: Some(source.id.clone()),
        },
        other => DocumentDetails::default_for(other),
    };

    let follow_lines: Vec<Line> = lines
        .iter()
        .filter(|line| line.quantity_fact > 0)
        .enumerate()
        .map(|(index, line)| {
            Line::planned(
                LineId::new(format!("{}-{}", id, index + 1)),
                id.clone(),
                line.product(),
                line.quantity_fact,
                line.cell_id.clone(),
            )
        })
        .collect();

    let mut document = Document::new(id, details, now);
    document.recount(&follow_lines);
    Some((document, follow_lines))
}
