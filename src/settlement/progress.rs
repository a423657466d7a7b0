use super::OperationReport;
use crate::error::OperationError;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Emitted after every processed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Accounts processed so far.
    pub completed: usize,
    /// Accounts in the operation.
    pub total: usize,
    /// Human readable summary of the last batch.
    pub detail: String,
}

/// Creates a bounded progress channel.
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSender { tx: Some(tx) }, ProgressStream { rx })
}

/// Sending half of a progress channel.
///
/// Events are dropped silently once the stream is gone.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// A sender that discards every event.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Sends an event, waiting for capacity.
    pub async fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Ordered stream of [`ProgressEvent`]s of a running operation.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl ProgressStream {
    /// Polls for the next progress event.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<ProgressEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

/// Handle to a spawned distribute or collect operation.
#[derive(Debug)]
pub struct OperationHandle {
    progress: ProgressStream,
    cancel: CancellationToken,
    task: JoinHandle<Result<OperationReport, OperationError>>,
}

impl OperationHandle {
    pub(crate) fn new(
        progress: ProgressStream,
        cancel: CancellationToken,
        task: JoinHandle<Result<OperationReport, OperationError>>,
    ) -> Self {
        Self { progress, cancel, task }
    }

    /// Progress events of the operation.
    pub fn progress(&mut self) -> &mut ProgressStream {
        &mut self.progress
    }

    /// Requests cancellation.
    ///
    /// Batches already in flight run to completion, every entry that has not started yet is
    /// reported as failed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token cancelling this operation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the final report, discarding any progress events not consumed yet.
    pub async fn report(self) -> Result<OperationReport, OperationError> {
        let Self { progress, task, .. } = self;
        drop(progress);
        task.await?
    }
}
