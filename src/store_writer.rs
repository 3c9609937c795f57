use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::record_store::{RecordStore, StoreError};
use crate::submission::{RecordKey, Submission};

pub const WRITE_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct WriteRequest {
    key: RecordKey,
    submission: Submission,
    reply: oneshot::Sender<Result<(), StoreError>>,
}

/// Handle to the task that owns the [`RecordStore`].
///
/// All appends funnel through one channel and are applied one at a time in
/// the order they were queued, so two load-modify-save cycles never
/// interleave within this process.
#[derive(Debug, Clone)]
pub struct StoreWriter {
    sender: mpsc::Sender<WriteRequest>,
}

impl StoreWriter {
    /// Spawns the writer task. It stops once every handle has been dropped.
    pub fn spawn(store: RecordStore) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<WriteRequest>(WRITE_QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let result = store
                    .append_and_save(request.key, request.submission)
                    .await;

                // The caller may have given up waiting; the write still happened.
                let _ = request.reply.send(result);
            }

            tracing::debug!("record store writer stopped");
        });

        (StoreWriter { sender }, handle)
    }

    /// Queues an append and waits until it has been saved or has failed.
    pub async fn append(&self, key: RecordKey, submission: Submission) -> Result<(), StoreError> {
        let (reply, response) = oneshot::channel();

        self.sender
            .send(WriteRequest {
                key,
                submission,
                reply,
            })
            .await
            .map_err(|_| StoreError::WriterClosed)?;

        response.await.map_err(|_| StoreError::WriterClosed)?
    }
}
