/*!
 * # Sync Queue
 *
 * Offline action log fed after every committed change. Retry, backoff and delivery ordering
 * belong to whoever drains the queue.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use strum::{Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

/// Sync queue errors
#[derive(Error, Debug)]
pub enum SyncQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Queue lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncActionType {
    UpdateLine,
    CompleteDoc,
}

/// Envelope for queued actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAction {
    pub id: Uuid,
    pub action_type: SyncActionType,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub retry_count: u32,
}

impl SyncAction {
    pub fn new(action_type: SyncActionType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            payload,
            created_at: chrono::Utc::now(),
            retry_count: 0,
        }
    }
}

#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn enqueue(
        &self,
        action_type: SyncActionType,
        payload: serde_json::Value,
    ) -> Result<(), SyncQueueError>;
}

/// Bounded in-memory FIFO.
#[derive(Debug, Clone)]
pub struct InMemorySyncQueue {
    actions: Arc<Mutex<VecDeque<SyncAction>>>,
    max_size: usize,
}

impl InMemorySyncQueue {
    pub fn new() -> Self {
        Self::with_max_size(1000)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            actions: Arc::new(Mutex::new(VecDeque::new())),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<SyncAction> {
        match self.actions.lock() {
            Ok(mut queue) => {
                let drained: Vec<SyncAction> = queue.drain(..).collect();
                drained
            }
            Err(_) => Vec::new(),
        }
    }
}

impl Default for InMemorySyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncQueue for InMemorySyncQueue {
    async fn enqueue(
        &self,
        action_type: SyncActionType,
        payload: serde_json::Value,
    ) -> Result<(), SyncQueueError> {
        let mut queue = self.actions.lock().map_err(|_| SyncQueueError::Poisoned)?;
        if queue.len() >= self.max_size {
            return Err(SyncQueueError::QueueFull);
        }
        queue.push_back(SyncAction::new(action_type, payload));
        Ok(())
    }
}
