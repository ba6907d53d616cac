//! Ambient collaborators handed to the engine instead of being looked up globally.

use metrics::{counter, histogram};
use std::fmt::Debug;
use std::sync::Arc;

use crate::models::{DiscrepancyKind, DocumentType, LineStatus};
use crate::services::debounce::{Clock, SystemClock};

/// Sink for engine telemetry.
pub trait ScanMetrics: Send + Sync + Debug {
    fn scan_resolved(&self, doc_type: DocumentType, outcome: &'static str);
    fn line_reconciled(&self, doc_type: DocumentType, status: LineStatus);
    fn scan_coalesced(&self, doc_type: DocumentType);
    fn document_completed(&self, doc_type: DocumentType, discrepancies: &[DiscrepancyKind]);
}

/// Emits through the `metrics` facade; a no-op until the host installs a recorder.
#[derive(Debug, Default, Clone)]
pub struct MetricsFacade;

impl ScanMetrics for MetricsFacade {
    fn scan_resolved(&self, doc_type: DocumentType, outcome: &'static str) {
        counter!("warehouse.scans.resolved", 1, "document_type" => doc_type.to_string(), "outcome" => outcome);
    }

    fn line_reconciled(&self, doc_type: DocumentType, status: LineStatus) {
        counter!("warehouse.lines.reconciled", 1, "document_type" => doc_type.to_string(), "status" => status.to_string());
    }

    fn scan_coalesced(&self, doc_type: DocumentType) {
        counter!("warehouse.scans.coalesced", 1, "document_type" => doc_type.to_string());
    }

    fn document_completed(&self, doc_type: DocumentType, discrepancies: &[DiscrepancyKind]) {
        counter!("warehouse.documents.completed", 1, "document_type" => doc_type.to_string());
        histogram!(
            "warehouse.documents.discrepancies",
            discrepancies.len() as f64,
            "document_type" => doc_type.to_string()
        );
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopMetrics;

impl ScanMetrics for NoopMetrics {
    fn scan_resolved(&self, _doc_type: DocumentType, _outcome: &'static str) {}
    fn line_reconciled(&self, _doc_type: DocumentType, _status: LineStatus) {}
    fn scan_coalesced(&self, _doc_type: DocumentType) {}
    fn document_completed(&self, _doc_type: DocumentType, _discrepancies: &[DiscrepancyKind]) {}
}

/// Experiment switches that may turn policy behaviour off for a rollout cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    RouteAutoAdvance,
    ZoneFiltering,
}

pub trait FeatureFlags: Send + Sync + Debug {
    fn is_enabled(&self, flag: Flag) -> bool;
}

/// Fixed flag values, all on by default.
#[derive(Debug, Clone)]
pub struct StaticFlags {
    pub route_auto_advance: bool,
    pub zone_filtering: bool,
}

impl Default for StaticFlags {
    fn default() -> Self {
        Self {
            route_auto_advance: true,
            zone_filtering: true,
        }
    }
}

impl FeatureFlags for StaticFlags {
    fn is_enabled(&self, flag: Flag) -> bool {
        match flag {
            Flag::RouteAutoAdvance => self.route_auto_advance,
            Flag::ZoneFiltering => self.zone_filtering,
        }
    }
}

/// Bundle of injected collaborators shared by the engine's services.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<dyn ScanMetrics>,
    pub flags: Arc<dyn FeatureFlags>,
}

impl EngineContext {
    pub fn new(
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn ScanMetrics>,
        flags: Arc<dyn FeatureFlags>,
    ) -> Self {
        Self {
            clock,
            metrics,
            flags,
        }
    }

    /// Wall clock, `metrics` facade and default flags.
    pub fn system() -> Self {
        Self::new(
            Arc::new(SystemClock::new()),
            Arc::new(MetricsFacade),
            Arc::new(StaticFlags::default()),
        )
    }
}
