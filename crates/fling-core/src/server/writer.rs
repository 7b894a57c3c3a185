//! Ordered disk writes for uploads.
//!
//! Upload chunks are handed to a dedicated writer task over a channel
//! and applied strictly in arrival order. The receiving side never
//! touches the file handle itself, so partial files stay contiguous
//! even if the network side is torn down mid-transfer.

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

/// Chunks buffered between the socket reader and the disk writer.
const QUEUE_DEPTH: usize = 16;

/// Handle to a spawned writer task for one destination file.
pub struct WriteQueue {
    tx: mpsc::Sender<Vec<u8>>,
    done: oneshot::Receiver<Result<u64>>,
}

impl WriteQueue {
    /// Spawn a writer task that owns `file` and applies queued chunks
    /// in order.
    #[must_use]
    pub fn spawn(mut file: File) -> Self {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(QUEUE_DEPTH);
        let (done_tx, done) = oneshot::channel();

        tokio::spawn(async move {
            let mut written: u64 = 0;
            let mut outcome: Result<u64> = Ok(0);

            while let Some(chunk) = rx.recv().await {
                if let Err(e) = file.write_all(&chunk).await {
                    outcome = Err(Error::Io(e));
                    break;
                }
                written += chunk.len() as u64;
            }

            if outcome.is_ok() {
                outcome = match file.flush().await {
                    Ok(()) => Ok(written),
                    Err(e) => Err(Error::Io(e)),
                };
            }

            // Drain anything still queued so the sender is not left
            // blocked on a full channel after a write error.
            rx.close();
            while rx.recv().await.is_some() {}

            let _ = done_tx.send(outcome);
        });

        Self { tx, done }
    }

    /// Queue one chunk for writing. Applies backpressure when the
    /// writer falls behind the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer task has already failed.
    pub async fn push(&self, chunk: Vec<u8>) -> Result<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| Error::Internal("upload writer stopped".to_string()))
    }

    /// Close the queue and wait for the writer to flush.
    ///
    /// # Errors
    ///
    /// Returns the writer's error if any queued write failed.
    pub async fn finish(self) -> Result<u64> {
        drop(self.tx);
        self.done
            .await
            .map_err(|_| Error::Internal("upload writer vanished".to_string()))?
    }
}
