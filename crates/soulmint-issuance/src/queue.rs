//! Write submission and the sequential chunk queue.
//!
//! Batch chunks from one signer must not be in flight at the same time.
//! A single worker task drains the queue and only takes the next chunk after
//! the previous chunk's submission has settled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use soulmint_core::{ContractWriter, LogEntry, SubmissionId, WriteCall};
use tokio::sync::{mpsc, oneshot};

use crate::audit::AuditLog;
use crate::chunk::Chunk;
use crate::error::{IssuanceError, IssuanceResult};
use crate::session::SessionCounter;

pub const SUBMISSION_ERROR_ACTION: &str = "tx-error";
pub const SUBMISSION_TIMEOUT_ACTION: &str = "tx-timeout";

/// Hands writes to the collaborator and records submission failures.
#[derive(Clone)]
pub struct Submitter {
    writer: Arc<dyn ContractWriter>,
    log: Arc<AuditLog>,
    timeout: Option<Duration>,
}

impl Submitter {
    pub fn new(
        writer: Arc<dyn ContractWriter>,
        log: Arc<AuditLog>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            writer,
            log,
            timeout,
        }
    }

    /// Submit one write. A rejection or timeout is appended to the log and
    /// returned as `SubmissionFailed`; nothing is retried.
    pub async fn submit(&self, call: WriteCall) -> IssuanceResult<SubmissionId> {
        let function = call.function_name();
        let pending = self.writer.submit(call);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result,
                Err(_) => {
                    let note = format!("submission did not settle within {}s", limit.as_secs());
                    tracing::warn!(function, timeout_secs = limit.as_secs(), "submission timed out");
                    self.log
                        .append(LogEntry::error(SUBMISSION_TIMEOUT_ACTION, note.clone()));
                    return Err(IssuanceError::SubmissionFailed(note));
                }
            },
            None => pending.await,
        };

        match result {
            Ok(id) => {
                tracing::info!(function, submission = %id, "write submitted");
                Ok(id)
            }
            Err(e) => {
                let message = match e {
                    soulmint_core::CoreError::ChainWrite(m) => m,
                    other => other.to_string(),
                };
                tracing::warn!(function, error = %message, "write submission failed");
                self.log
                    .append(LogEntry::error(SUBMISSION_ERROR_ACTION, message.clone()));
                Err(IssuanceError::SubmissionFailed(message))
            }
        }
    }
}

/// Result of one chunk's submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub index: usize,
    pub size: usize,
    pub result: IssuanceResult<SubmissionId>,
}

struct ChunkTask {
    chunk: Chunk,
    total: usize,
    reply: oneshot::Sender<ChunkOutcome>,
}

/// Pending-entry label for a chunk.
pub fn chunk_label(index: usize, total: usize, size: usize) -> String {
    format!("mintBatch chunk {}/{} ({})", index, total, size)
}

/// Single-worker, in-order queue of chunk submissions.
pub struct ChunkQueue {
    tasks: Mutex<mpsc::UnboundedSender<ChunkTask>>,
}

impl ChunkQueue {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn spawn(submitter: Submitter, session: Arc<SessionCounter>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChunkTask>();

        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let outcome = run_chunk(&submitter, &session, task.chunk, task.total).await;
                // The batch caller may have gone away; the chunk still ran.
                let _ = task.reply.send(outcome);
            }
            tracing::debug!("chunk queue closed");
        });

        Self { tasks: Mutex::new(tx) }
    }

    /// Enqueue every chunk of one batch and wait for all of them.
    ///
    /// Chunks of a batch are enqueued contiguously, so batches started
    /// concurrently never interleave.
    pub async fn run_batch(&self, chunks: Vec<Chunk>) -> Vec<ChunkOutcome> {
        let total = chunks.len();
        let mut replies = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);

        {
            let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            for chunk in chunks {
                let (reply, rx) = oneshot::channel();
                let index = chunk.index;
                let size = chunk.len();
                let task = ChunkTask {
                    chunk,
                    total,
                    reply,
                };
                if tasks.send(task).is_err() {
                    outcomes.push(ChunkOutcome {
                        index,
                        size,
                        result: Err(IssuanceError::SubmissionFailed(
                            "chunk queue is closed".into(),
                        )),
                    });
                    continue;
                }
                replies.push((index, size, rx));
            }
        }

        for (index, size, rx) in replies {
            let outcome = rx.await.unwrap_or_else(|_| ChunkOutcome {
                index,
                size,
                result: Err(IssuanceError::SubmissionFailed(
                    "chunk worker stopped".into(),
                )),
            });
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }
}

async fn run_chunk(
    submitter: &Submitter,
    session: &SessionCounter,
    chunk: Chunk,
    total: usize,
) -> ChunkOutcome {
    let index = chunk.index;
    let size = chunk.len();

    submitter
        .log
        .append(LogEntry::pending(chunk_label(index, total, size)));

    let result = submitter
        .submit(WriteCall::MintBatch {
            students: chunk.recipients,
        })
        .await;

    // Counted whether or not the submission went through.
    let issued = session.add(size as u64);
    tracing::debug!(chunk = index, total, size, session_issued = issued, "chunk settled");

    ChunkOutcome {
        index,
        size,
        result,
    }
}
