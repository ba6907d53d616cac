use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    config::AppConfig,
    events::EventSender,
    repositories::{DocumentRepository, InMemoryRepository},
    services::{
        collaborators::EngineContext,
        document_lifecycle::DocumentLifecycle,
        route_engine::AdvanceTicket,
        scan_engine::ScanEngine,
        scheduler::AutoAdvanceScheduler,
    },
    sources::{demo::DemoPlanSource, json_dir::JsonDirPlanSource, PlanSource},
    sync_queue::{InMemorySyncQueue, SyncQueue},
};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    config: AppConfig,
    event_sender: EventSender,
    ctx: EngineContext,
    repository: Arc<InMemoryRepository>,
    sync_queue: Arc<InMemorySyncQueue>,
}

impl ServiceFactory {
    /// Creates a new service factory with the given dependencies
    pub fn new(config: AppConfig, event_sender: EventSender) -> Self {
        Self::with_context(config, event_sender, EngineContext::system())
    }

    /// Same as [`ServiceFactory::new`] with injected clock, metrics and flags.
    pub fn with_context(config: AppConfig, event_sender: EventSender, ctx: EngineContext) -> Self {
        let sync_queue = Arc::new(InMemorySyncQueue::with_max_size(
            config.sync_queue_capacity,
        ));
        Self {
            config,
            event_sender,
            ctx,
            repository: Arc::new(InMemoryRepository::new()),
            sync_queue,
        }
    }

    /// Plan sources in lookup order: exported plans first, then demo plans.
    pub fn plan_sources(&self) -> Vec<Arc<dyn PlanSource>> {
        let mut sources: Vec<Arc<dyn PlanSource>> = Vec::new();
        if let Some(dir) = &self.config.plan_dir {
            info!(plan_dir = %dir.display(), "using exported plans");
            sources.push(Arc::new(JsonDirPlanSource::new(dir.clone())));
        }
        if self.config.demo_fallback {
            sources.push(Arc::new(DemoPlanSource::new()));
        }
        sources
    }

    /// Creates the document lifecycle service
    pub fn document_lifecycle(&self) -> DocumentLifecycle {
        let repository: Arc<dyn DocumentRepository> = self.repository.clone();
        let sync_queue: Arc<dyn SyncQueue> = self.sync_queue.clone();
        DocumentLifecycle::new(
            repository,
            self.plan_sources(),
            sync_queue,
            self.event_sender.clone(),
            self.ctx.clone(),
            self.config.auto_create_follow_on,
        )
    }

    /// Creates the scan engine
    pub fn scan_engine(&self) -> ScanEngine {
        ScanEngine::new(self.document_lifecycle(), self.config.engine_settings())
    }

    /// Creates the auto-advance scheduler and its ticket receiver
    pub fn auto_advance_scheduler(&self) -> (AutoAdvanceScheduler, mpsc::Receiver<AdvanceTicket>) {
        AutoAdvanceScheduler::new(self.config.auto_advance_delay())
    }

    /// Gets a reference to the local document cache
    pub fn repository(&self) -> &Arc<InMemoryRepository> {
        &self.repository
    }

    /// Gets a reference to the outbound sync queue
    pub fn sync_queue(&self) -> &Arc<InMemorySyncQueue> {
        &self.sync_queue
    }

    /// Gets a reference to the event sender
    pub fn event_sender(&self) -> &EventSender {
        &self.event_sender
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub engine: Arc<ScanEngine>,
    pub repository: Arc<InMemoryRepository>,
    pub sync_queue: Arc<InMemorySyncQueue>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        Self {
            engine: Arc::new(factory.scan_engine()),
            repository: factory.repository().clone(),
            sync_queue: factory.sync_queue().clone(),
        }
    }
}
