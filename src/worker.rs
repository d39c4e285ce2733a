//! Background extraction worker
//!
//! Callers enqueue and return at once. A dispatcher drains the bounded queue
//! and runs at most `concurrency` pipeline jobs at a time. Job failures are
//! logged and counted, never handed back to the enqueuing caller.

use crate::accumulator::ProcessTextRequest;
use crate::config::WorkerConfig;
use crate::pipeline::IngestPipeline;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Counters since the worker started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub failed: usize,
    pub dropped: usize,
}

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct ExtractionWorker {
    sender: mpsc::Sender<ProcessTextRequest>,
    dispatcher: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl ExtractionWorker {
    /// Start the dispatcher on the current tokio runtime.
    pub fn spawn(pipeline: Arc<IngestPipeline>, config: &WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

        let dispatcher = tokio::spawn(dispatch(receiver, pipeline, semaphore, counters.clone()));
        info!(
            queue_capacity = config.queue_capacity,
            concurrency = config.concurrency,
            "extraction worker started"
        );

        Self {
            sender,
            dispatcher,
            counters,
        }
    }

    /// Queue a request without waiting. Returns false, with a warning, when
    /// the queue is full or already closed.
    pub fn enqueue(&self, request: ProcessTextRequest) -> bool {
        match self.sender.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(source_id = %request.source_id, "extraction queue full, job dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(source_id = %request.source_id, "extraction queue closed, job dropped");
                false
            }
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// Close the queue, let queued and in-flight jobs finish, then return the
    /// final counters.
    pub async fn shutdown(self) -> WorkerStats {
        let Self {
            sender,
            dispatcher,
            counters,
        } = self;
        drop(sender);
        if let Err(e) = dispatcher.await {
            warn!(error = %e, "extraction dispatcher panicked");
        }
        let stats = counters.snapshot();
        info!(
            processed = stats.processed,
            failed = stats.failed,
            dropped = stats.dropped,
            "extraction worker stopped"
        );
        stats
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<ProcessTextRequest>,
    pipeline: Arc<IngestPipeline>,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
) {
    let mut jobs = JoinSet::new();

    while let Some(request) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let pipeline = pipeline.clone();
        let counters = counters.clone();
        jobs.spawn(async move {
            let _permit = permit;
            run_job(&pipeline, request, &counters).await;
        });
        while let Some(joined) = jobs.try_join_next() {
            log_join(joined);
        }
    }

    while let Some(joined) = jobs.join_next().await {
        log_join(joined);
    }
}

async fn run_job(pipeline: &IngestPipeline, request: ProcessTextRequest, counters: &Counters) {
    match pipeline.process(&request).await {
        Ok(outcome) => {
            counters.processed.fetch_add(1, Ordering::Relaxed);
            debug!(
                source_id = %request.source_id,
                nodes = outcome.nodes.len(),
                "background job done"
            );
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                source_id = %request.source_id,
                owner_id = %request.owner_id,
                error = %e,
                "background job failed"
            );
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "background job panicked");
    }
}
