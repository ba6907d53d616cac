use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::services::route_engine::AdvanceTicket;

/// Delivers route advance tickets after a fixed delay.
#[derive(Debug)]
pub struct AutoAdvanceScheduler {
    delay: Duration,
    sender: mpsc::Sender<AdvanceTicket>,
}

/// Pending advance. Dropping it does not cancel; call [`ScheduledAdvance::cancel`].
#[derive(Debug)]
pub struct ScheduledAdvance {
    ticket: AdvanceTicket,
    handle: JoinHandle<()>,
}

impl ScheduledAdvance {
    pub fn ticket(&self) -> AdvanceTicket {
        self.ticket
    }

    pub fn cancel(self) {
        debug!(ticket = ?self.ticket, "auto-advance cancelled");
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl AutoAdvanceScheduler {
    pub fn new(delay: Duration) -> (Self, mpsc::Receiver<AdvanceTicket>) {
        let (sender, receiver) = mpsc::channel(16);
        (Self { delay, sender }, receiver)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Must be called inside a tokio runtime.
    pub fn schedule(&self, ticket: AdvanceTicket) -> ScheduledAdvance {
        let sender = self.sender.clone();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(ticket).await.is_err() {
                debug!(?ticket, "advance receiver closed");
            }
        });
        ScheduledAdvance { ticket, handle }
    }
}
