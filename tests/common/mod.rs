#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mockall::mock;
use stateset_warehouse::{
    errors::ServiceError,
    events::{self, Event},
    models::{Document, DocumentId, DocumentType, Line},
    repositories::{DocumentRepository, InMemoryRepository},
    services::{
        collaborators::{EngineContext, NoopMetrics, StaticFlags},
        debounce::ManualClock,
        document_lifecycle::DocumentLifecycle,
        scan_engine::{EngineSettings, ScanEngine},
    },
    sources::{DemoPlanSource, PlanSnapshot, PlanSource},
    sync_queue::{InMemorySyncQueue, SyncActionType, SyncQueue, SyncQueueError},
};
use tokio::sync::mpsc;

mock! {
    pub Source {}

    #[async_trait]
    impl PlanSource for Source {
        fn name(&self) -> &'static str;

        async fn fetch_plan(
            &self,
            doc_type: DocumentType,
            id: &DocumentId,
        ) -> Result<Option<PlanSnapshot>, ServiceError>;
    }
}

mock! {
    pub Queue {}

    #[async_trait]
    impl SyncQueue for Queue {
        async fn enqueue(
            &self,
            action_type: SyncActionType,
            payload: serde_json::Value,
        ) -> Result<(), SyncQueueError>;
    }
}

mock! {
    pub Repository {}

    #[async_trait]
    impl DocumentRepository for Repository {
        async fn get(
            &self,
            doc_type: DocumentType,
            id: &DocumentId,
        ) -> Result<Option<Document>, ServiceError>;

        async fn get_lines(
            &self,
            doc_type: DocumentType,
            id: &DocumentId,
        ) -> Result<Vec<Line>, ServiceError>;

        async fn upsert_line(&self, doc_type: DocumentType, line: &Line) -> Result<(), ServiceError>;

        async fn upsert_document(&self, document: &Document) -> Result<(), ServiceError>;

        async fn bulk_put(&self, document: &Document, lines: &[Line]) -> Result<(), ServiceError>;
    }
}

/// Engine wired to in-memory storage, a manual clock and the demo plans.
pub struct TestEngine {
    pub engine: ScanEngine,
    pub clock: Arc<ManualClock>,
    pub repository: Arc<InMemoryRepository>,
    pub sync_queue: Arc<InMemorySyncQueue>,
    events: mpsc::Receiver<Event>,
}

pub struct Builder {
    flags: StaticFlags,
    settings: EngineSettings,
    sources: Vec<Arc<dyn PlanSource>>,
    repository: Option<Arc<dyn DocumentRepository>>,
    sync_queue: Option<Arc<dyn SyncQueue>>,
    auto_create_follow_on: bool,
}

impl Builder {
    pub fn flags(mut self, flags: StaticFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn sources(mut self, sources: Vec<Arc<dyn PlanSource>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn repository(mut self, repository: Arc<dyn DocumentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn sync_queue(mut self, sync_queue: Arc<dyn SyncQueue>) -> Self {
        self.sync_queue = Some(sync_queue);
        self
    }

    pub fn auto_create_follow_on(mut self, enabled: bool) -> Self {
        self.auto_create_follow_on = enabled;
        self
    }

    pub fn build(self) -> TestEngine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));
        let ctx = EngineContext::new(clock.clone(), Arc::new(NoopMetrics), Arc::new(self.flags));
        let repository = Arc::new(InMemoryRepository::new());
        let sync_queue = Arc::new(InMemorySyncQueue::new());
        let (sender, events) = events::channel(4096);

        let lifecycle = DocumentLifecycle::new(
            self.repository
                .unwrap_or_else(|| repository.clone() as Arc<dyn DocumentRepository>),
            self.sources,
            self.sync_queue
                .unwrap_or_else(|| sync_queue.clone() as Arc<dyn SyncQueue>),
            sender,
            ctx,
            self.auto_create_follow_on,
        );

        TestEngine {
            engine: ScanEngine::new(lifecycle, self.settings),
            clock,
            repository,
            sync_queue,
            events,
        }
    }
}

impl TestEngine {
    pub fn builder() -> Builder {
        Builder {
            flags: StaticFlags::default(),
            settings: EngineSettings::default(),
            sources: vec![Arc::new(DemoPlanSource::new())],
            repository: None,
            sync_queue: None,
            auto_create_follow_on: true,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Events emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
