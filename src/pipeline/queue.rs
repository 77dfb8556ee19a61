use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::handler::MediaIngestionHandler;
use super::types::{HandlerReport, HandlerState, MediaNotification};

/// Sending half of the notification queue. The listener and the HTTP trigger
/// both hold a clone.
#[derive(Clone)]
pub struct JobQueue {
    sender: Sender<MediaNotification>,
}

/// Receiving half, consumed by exactly one [`Dispatcher`].
pub struct JobReceiver {
    receiver: Receiver<MediaNotification>,
}

pub fn channel(capacity: usize) -> (JobQueue, JobReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (JobQueue { sender }, JobReceiver { receiver })
}

impl JobReceiver {
    pub async fn recv(&mut self) -> Option<MediaNotification> {
        self.receiver.recv().await
    }
}

impl JobQueue {
    /// Waits for room when the queue is full.
    pub async fn push(&self, notification: MediaNotification) -> Result<()> {
        self.sender
            .send(notification)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to push to job queue: {}", e))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub done: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl DispatchSummary {
    fn record(&mut self, report: &HandlerReport) {
        if report.is_skip() {
            self.skipped += 1;
        } else if report.state() == HandlerState::Errored {
            self.errored += 1;
        } else {
            self.done += 1;
        }
    }
}

/// Drains the queue, running up to `max_concurrent` handlers at a time.
/// Each handler runs on its own task, so a panic in one run is contained.
pub struct Dispatcher {
    receiver: JobReceiver,
    handler: Arc<MediaIngestionHandler>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        receiver: JobReceiver,
        handler: Arc<MediaIngestionHandler>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            receiver,
            handler,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Runs until every [`JobQueue`] clone is dropped and in-flight work is
    /// finished.
    pub async fn run(mut self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let mut tasks: JoinSet<HandlerReport> = JoinSet::new();

        loop {
            tokio::select! {
                maybe = self.receiver.recv() => {
                    let Some(notification) = maybe else { break };
                    let permit = match self.permits.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    debug!("Dispatching {}", notification);
                    let handler = self.handler.clone();
                    tasks.spawn(async move {
                        let report = handler.handle(notification).await;
                        drop(permit);
                        report
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    record_join(&mut summary, joined);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            record_join(&mut summary, joined);
        }

        info!(
            "Dispatcher stopped: {} published, {} skipped, {} errored",
            summary.done, summary.skipped, summary.errored
        );
        summary
    }
}

fn record_join(
    summary: &mut DispatchSummary,
    joined: Result<HandlerReport, tokio::task::JoinError>,
) {
    match joined {
        Ok(report) => {
            if report.is_skip() {
                debug!("{}", report);
            } else if report.error.is_some() {
                warn!("{}", report);
            } else {
                info!("{}", report);
            }
            summary.record(&report);
        }
        Err(e) => {
            error!("Handler task failed: {}", e);
            summary.errored += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_waits_for_room() {
        let (queue, mut receiver) = channel(1);
        queue.push(MediaNotification::new("a")).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            queue.push(MediaNotification::new("b")),
        )
        .await;
        assert!(blocked.is_err());

        assert_eq!(receiver.recv().await.unwrap().source, "a");
        queue.push(MediaNotification::new("c")).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap().source, "c");
    }

    #[tokio::test]
    async fn test_closed_when_receiver_dropped() {
        let (queue, receiver) = channel(4);
        assert!(!queue.is_closed());
        drop(receiver);
        assert!(queue.is_closed());
        assert!(queue.push(MediaNotification::new("late")).await.is_err());
    }
}
