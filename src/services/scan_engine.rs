use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, info, instrument};

use crate::errors::{PolicyViolation, ServiceError};
use crate::events::Event;
use crate::models::{
    CellCode, DiscrepancyRecord, DiscrepancySnapshot, Document, DocumentDetails, DocumentId,
    DocumentType, Line, LineId, ReconcilePolicy,
};
use crate::services::collaborators::{EngineContext, Flag};
use crate::services::debounce::CompletionDebouncer;
use crate::services::document_lifecycle::{DocumentLifecycle, FinishOutcome, LoadedDocument};
use crate::services::line_reconciler;
use crate::services::route_engine::{AdvanceTicket, Route};
use crate::services::scan_resolver::{self, Resolution, ScanContext};
use crate::services::zone_ranker::{ZoneSettings, ZoneTracker};

/// Engine-wide knobs, normally built from `AppConfig`.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub completion_cooldown: Duration,
    pub guidance_limit: usize,
    pub zone: ZoneSettings,
    pub policies: HashMap<DocumentType, ReconcilePolicy>,
}

impl EngineSettings {
    pub fn policy_for(&self, doc_type: DocumentType) -> ReconcilePolicy {
        self.policies
            .get(&doc_type)
            .copied()
            .unwrap_or_else(|| ReconcilePolicy::for_type(doc_type))
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            completion_cooldown: Duration::from_millis(1000),
            guidance_limit: 3,
            zone: ZoneSettings::default(),
            policies: DocumentType::iter()
                .map(|doc_type| (doc_type, ReconcilePolicy::for_type(doc_type)))
                .collect(),
        }
    }
}

/// In-memory authoritative state for one open document. Callers hold it by `&mut`, which
/// serializes scan handling per document.
#[derive(Debug)]
pub struct ScanSession {
    document: Document,
    lines: Vec<Line>,
    policy: ReconcilePolicy,
    active_cell: Option<CellCode>,
    route: Option<Route>,
    zones: Option<ZoneTracker>,
    debouncer: CompletionDebouncer,
    origin: String,
}

impl ScanSession {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, id: &LineId) -> Option<&Line> {
        self.lines.iter().find(|line| &line.id == id)
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    pub fn active_cell(&self) -> Option<&CellCode> {
        self.active_cell.as_ref()
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn zones(&self) -> Option<&ZoneTracker> {
        self.zones.as_ref()
    }

    /// Where the session was loaded from: `cache`, `created` or a plan source name.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.document.is_completed() {
            return Err(ServiceError::InvalidStatus(format!(
                "{} document {} is completed",
                self.document.doc_type, self.document.id
            )));
        }
        Ok(())
    }

    fn index_of(&self, id: &LineId) -> Result<usize, ServiceError> {
        self.lines
            .iter()
            .position(|line| &line.id == id)
            .ok_or_else(|| {
                ServiceError::not_found(format!("line {} not found", id), Default::default())
            })
    }

    fn route_mut(&mut self) -> Result<&mut Route, ServiceError> {
        let doc_type = self.document.doc_type;
        self.route.as_mut().ok_or_else(|| {
            ServiceError::InvalidStatus(format!("{} documents have no route", doc_type))
        })
    }

    /// Cell the resolver should scope product scans to.
    fn scope_cell(&self) -> Option<CellCode> {
        match &self.route {
            Some(route) if route.is_awaiting_product() => {
                route.current_cell().and_then(CellCode::parse)
            }
            Some(_) => None,
            None => self.active_cell.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    CellEntered {
        cell: CellCode,
        /// Set when the scan moved the assumed placement zone.
        zone_changed: Option<String>,
    },
    LineUpdated {
        line: Line,
        /// Present when the scan filled the current route step and auto-advance is on.
        advance: Option<AdvanceTicket>,
    },
    LineCreated {
        line: Line,
    },
    /// Duplicate scan inside the completion cooldown; the line is returned unchanged.
    Coalesced {
        line: Line,
    },
}

/// Position of a route after a navigation action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteProgress {
    pub current_step: Option<usize>,
    pub complete: bool,
    /// Shortages added by "not in cell".
    pub missing: Vec<DiscrepancyRecord>,
}

/// Reconciliation engine shared by every workflow; behaviour differs only by policy.
#[derive(Clone)]
pub struct ScanEngine {
    lifecycle: DocumentLifecycle,
    ctx: EngineContext,
    settings: EngineSettings,
}

impl ScanEngine {
    pub fn new(lifecycle: DocumentLifecycle, settings: EngineSettings) -> Self {
        let ctx = lifecycle.context().clone();
        Self {
            lifecycle,
            ctx,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn lifecycle(&self) -> &DocumentLifecycle {
        &self.lifecycle
    }

    /// Opens an existing or upstream-planned document.
    #[instrument(skip(self))]
    pub async fn open(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<ScanSession, ServiceError> {
        let loaded = self.lifecycle.load(doc_type, id).await?;
        Ok(self.session(loaded))
    }

    /// Creates an operator-initiated document and opens it.
    #[instrument(skip(self))]
    pub async fn start(&self, details: DocumentDetails) -> Result<ScanSession, ServiceError> {
        let loaded = self.lifecycle.create(details).await?;
        Ok(self.session(loaded))
    }

    fn session(&self, loaded: LoadedDocument) -> ScanSession {
        let LoadedDocument {
            document,
            lines,
            origin,
        } = loaded;
        let policy = self.settings.policy_for(document.doc_type);
        let route = (document.doc_type == DocumentType::Picking).then(|| Route::resume(&lines));
        let zones = policy
            .zone_filter
            .then(|| ZoneTracker::new(self.settings.zone));

        ScanSession {
            document,
            lines,
            policy,
            active_cell: None,
            route,
            zones,
            debouncer: CompletionDebouncer::new(self.settings.completion_cooldown),
            origin,
        }
    }

    /// Handles one raw scanner payload.
    #[instrument(skip(self, session), fields(document_id = %session.document.id, doc_type = %session.document.doc_type))]
    pub async fn scan(
        &self,
        session: &mut ScanSession,
        code: &str,
        confirmed: bool,
    ) -> Result<ScanOutcome, ServiceError> {
        session.ensure_open()?;
        let doc_type = session.document.doc_type;
        scan_resolver::validate_code(code)?;

        if CellCode::parse(code).is_none() {
            if let Some(route) = &session.route {
                if !route.is_complete() && !route.is_awaiting_product() {
                    return Err(PolicyViolation::ScanCellFirst {
                        expected_cell: route.current_cell().map(str::to_string),
                    }
                    .into());
                }
            }
        }

        let scope_cell = session.scope_cell();
        let resolution = scan_resolver::resolve(
            code,
            &ScanContext {
                doc_type,
                policy: &session.policy,
                active_cell: scope_cell.as_ref(),
                lines: &session.lines,
                guidance_limit: self.settings.guidance_limit,
            },
        )?;

        match resolution {
            Resolution::Cell(cell) => {
                self.ctx.metrics.scan_resolved(doc_type, "cell");
                self.enter_cell(session, cell)
            }
            Resolution::Line(index) => {
                self.ctx.metrics.scan_resolved(doc_type, "line");
                match self.scan_line(session, index, confirmed).await {
                    Err(ServiceError::ConcurrencyGuard(line_id)) => {
                        debug!(%line_id, "duplicate scan coalesced");
                        self.ctx.metrics.scan_coalesced(doc_type);
                        Ok(ScanOutcome::Coalesced {
                            line: session.lines[index].clone(),
                        })
                    }
                    other => other,
                }
            }
            Resolution::Placeholder { product, cell_id } => {
                self.ctx.metrics.scan_resolved(doc_type, "placeholder");
                let line = Line::planned(
                    LineId::generate(),
                    session.document.id.clone(),
                    product,
                    0,
                    cell_id,
                );
                let updated =
                    line_reconciler::apply_delta(&line, 1, false, &session.policy, confirmed)?;
                if updated.status.is_done() {
                    let now = self.ctx.clock.monotonic();
                    session.debouncer.record_completion(updated.id.clone(), now);
                }
                let line = self.insert_line(session, stamp_scan(updated, &self.ctx)).await;
                Ok(ScanOutcome::LineCreated { line })
            }
        }
    }

    fn enter_cell(
        &self,
        session: &mut ScanSession,
        cell: CellCode,
    ) -> Result<ScanOutcome, ServiceError> {
        if let Some(route) = session.route.as_mut() {
            route.scan_cell(&cell)?;
        }
        let zone_changed = session
            .zones
            .as_mut()
            .and_then(|zones| zones.record(cell.clone()));
        if let Some(zone) = &zone_changed {
            debug!(%zone, "assumed zone changed");
        }
        session.active_cell = Some(cell.clone());
        Ok(ScanOutcome::CellEntered { cell, zone_changed })
    }

    async fn scan_line(
        &self,
        session: &mut ScanSession,
        index: usize,
        confirmed: bool,
    ) -> Result<ScanOutcome, ServiceError> {
        let line = &session.lines[index];
        if let Some(route) = &session.route {
            route.check_product(line)?;
        }

        let now = self.ctx.clock.monotonic();
        if session.debouncer.is_cooling_down(&line.id, now) {
            return Err(ServiceError::ConcurrencyGuard(line.id.clone()));
        }

        let was_done = line.status.is_done();
        let updated = line_reconciler::apply_delta(line, 1, false, &session.policy, confirmed)?;
        if updated.status.is_done() && !was_done {
            session.debouncer.record_completion(updated.id.clone(), now);
        }

        let line = self
            .commit(session, index, stamp_scan(updated, &self.ctx))
            .await;
        let advance = self.advance_ticket(session);
        Ok(ScanOutcome::LineUpdated { line, advance })
    }

    /// Manual quantity change: `+`/`-` buttons (relative) or a typed value (absolute).
    #[instrument(skip(self, session), fields(document_id = %session.document.id))]
    pub async fn adjust(
        &self,
        session: &mut ScanSession,
        line_id: &LineId,
        delta: i64,
        absolute: bool,
        confirmed: bool,
    ) -> Result<ScanOutcome, ServiceError> {
        session.ensure_open()?;
        let index = session.index_of(line_id)?;
        let updated = line_reconciler::apply_delta(
            &session.lines[index],
            delta,
            absolute,
            &session.policy,
            confirmed,
        )?;
        if !updated.status.is_done() {
            session.debouncer.reset(line_id);
        }

        let line = self.commit(session, index, updated).await;
        let advance = self.advance_ticket(session);
        Ok(ScanOutcome::LineUpdated { line, advance })
    }

    /// "All" shortcut: raises the fact to the plan, never above it and never down.
    #[instrument(skip(self, session), fields(document_id = %session.document.id))]
    pub async fn fill_to_plan(
        &self,
        session: &mut ScanSession,
        line_id: &LineId,
    ) -> Result<ScanOutcome, ServiceError> {
        session.ensure_open()?;
        let index = session.index_of(line_id)?;
        let current = &session.lines[index];
        if current.quantity_fact >= current.quantity_plan {
            return Ok(ScanOutcome::LineUpdated {
                line: current.clone(),
                advance: self.advance_ticket(session),
            });
        }
        let plan = i64::from(current.quantity_plan);
        self.adjust(session, line_id, plan, true, false).await
    }

    /// Skips the current route step regardless of its state.
    #[instrument(skip(self, session), fields(document_id = %session.document.id))]
    pub async fn skip_step(&self, session: &mut ScanSession) -> Result<RouteProgress, ServiceError> {
        session.ensure_open()?;
        let route = session.route_mut()?;
        let step_index = route.current_index();
        route.skip()?;
        self.after_navigation(session, step_index, true, Vec::new()).await
    }

    /// Marks every under-plan product of the current step missing and moves on.
    #[instrument(skip(self, session), fields(document_id = %session.document.id))]
    pub async fn not_in_cell(
        &self,
        session: &mut ScanSession,
    ) -> Result<RouteProgress, ServiceError> {
        session.ensure_open()?;
        let lines = session.lines.clone();
        let route = session.route_mut()?;
        let step_index = route.current_index();
        let missing = route.not_in_cell(&lines)?;
        info!(missing = missing.len(), "products reported missing");
        self.after_navigation(session, step_index, true, missing).await
    }

    /// Manual "next" once the current step is filled.
    #[instrument(skip(self, session), fields(document_id = %session.document.id))]
    pub async fn next_step(&self, session: &mut ScanSession) -> Result<RouteProgress, ServiceError> {
        session.ensure_open()?;
        let lines = session.lines.clone();
        let route = session.route_mut()?;
        let step_index = route.current_index();
        route.confirm_step(&lines)?;
        self.after_navigation(session, step_index, false, Vec::new()).await
    }

    /// Applies a delivered auto-advance ticket. Returns `None` for stale tickets.
    #[instrument(skip(self, session), fields(document_id = %session.document.id))]
    pub async fn apply_auto_advance(
        &self,
        session: &mut ScanSession,
        ticket: AdvanceTicket,
    ) -> Result<Option<RouteProgress>, ServiceError> {
        session.ensure_open()?;
        let lines = session.lines.clone();
        let route = session.route_mut()?;
        if !route.apply_ticket(ticket, &lines) {
            return Ok(None);
        }
        self.after_navigation(session, Some(ticket.step_index), false, Vec::new())
            .await
            .map(Some)
    }

    async fn after_navigation(
        &self,
        session: &mut ScanSession,
        left_step: Option<usize>,
        skipped: bool,
        missing: Vec<DiscrepancyRecord>,
    ) -> Result<RouteProgress, ServiceError> {
        session.active_cell = None;
        let (current_step, complete) = match &session.route {
            Some(route) => (route.current_index(), route.is_complete()),
            None => (None, false),
        };

        if let Some(step_index) = left_step {
            self.lifecycle
                .emit(Event::RouteStepAdvanced {
                    document_id: session.document.id.clone(),
                    step_index,
                    skipped,
                });
        }
        if complete {
            info!("route complete");
            self.lifecycle
                .emit(Event::RouteCompleted {
                    document_id: session.document.id.clone(),
                });
        }

        Ok(RouteProgress {
            current_step,
            complete,
            missing,
        })
    }

    fn advance_ticket(&self, session: &ScanSession) -> Option<AdvanceTicket> {
        if !session.policy.auto_advance || !self.ctx.flags.is_enabled(Flag::RouteAutoAdvance) {
            return None;
        }
        session
            .route
            .as_ref()
            .and_then(|route| route.ticket(&session.lines))
    }

    /// Lines in display order: proximity-ranked for zone-tracking sessions, table order
    /// otherwise.
    pub fn ranked_lines<'a>(&self, session: &'a ScanSession) -> Vec<&'a Line> {
        match &session.zones {
            Some(zones) => {
                let filter = session.policy.zone_filter
                    && self.ctx.flags.is_enabled(Flag::ZoneFiltering);
                zones.rank(&session.lines, filter)
            }
            None => session.lines.iter().collect(),
        }
    }

    pub fn lock_zone(&self, session: &mut ScanSession, zone: &str) -> Result<(), ServiceError> {
        let zones = session.zones.as_mut().ok_or_else(|| {
            ServiceError::InvalidStatus("zone filtering is not active".to_string())
        })?;
        zones.lock_zone(zone);
        Ok(())
    }

    pub fn unlock_zone(&self, session: &mut ScanSession) {
        if let Some(zones) = session.zones.as_mut() {
            zones.unlock_zone();
        }
    }

    /// Finishes the document. With discrepancies and `force` off nothing changes and the
    /// discrepancies are returned for confirmation.
    #[instrument(skip(self, session), fields(document_id = %session.document.id))]
    pub async fn finish(
        &self,
        session: &mut ScanSession,
        force: bool,
        attach_snapshot: bool,
    ) -> Result<FinishOutcome, ServiceError> {
        let missing: Vec<DiscrepancyRecord> = session
            .route
            .as_ref()
            .map(|route| route.missing().to_vec())
            .unwrap_or_default();
        self.lifecycle
            .finish(
                &mut session.document,
                &session.lines,
                force,
                attach_snapshot,
                &missing,
            )
            .await
    }

    /// Appends a discrepancy snapshot; allowed after completion.
    pub async fn append_snapshot(&self, session: &mut ScanSession) -> DiscrepancySnapshot {
        self.lifecycle
            .append_snapshot(&mut session.document, &session.lines)
            .await
    }

    async fn insert_line(&self, session: &mut ScanSession, line: Line) -> Line {
        info!(line_id = %line.id, barcode = %line.barcode, "placeholder line created");
        session.lines.push(line.clone());
        let index = session.lines.len() - 1;
        let line = self.commit(session, index, line).await;
        self.lifecycle
            .emit(Event::PlaceholderLineCreated {
                doc_type: session.document.doc_type,
                document_id: session.document.id.clone(),
                line_id: line.id.clone(),
                barcode: line.barcode.clone(),
                cell_id: line.cell_id.clone(),
            });
        line
    }

    /// Stores a reconciled line, recounts the document and publishes the change.
    async fn commit(&self, session: &mut ScanSession, index: usize, mut line: Line) -> Line {
        let now = self.ctx.clock.now_utc();
        line.revision += 1;
        session.lines[index] = line.clone();

        let document = &mut session.document;
        document.recount(&session.lines);
        let started = document.mark_started();
        document.touch(now);

        self.lifecycle.persist_line(document, &line).await;
        self.ctx.metrics.line_reconciled(document.doc_type, line.status);

        if started {
            self.lifecycle
                .emit(Event::DocumentStarted {
                    doc_type: document.doc_type,
                    document_id: document.id.clone(),
                });
        }
        self.lifecycle
            .emit(Event::LineReconciled {
                doc_type: document.doc_type,
                document_id: document.id.clone(),
                line_id: line.id.clone(),
                quantity_fact: line.quantity_fact,
                status: line.status,
            });
        line
    }
}

fn stamp_scan(mut line: Line, ctx: &EngineContext) -> Line {
    line.scan_count += 1;
    line.last_scan_at = Some(ctx.clock.now_utc());
    line
}
