//! Fixed pool of worker threads draining the intake queue.
//!
//! Detection is CPU-bound and blocking, so workers are plain OS threads
//! rather than tokio tasks. A panic inside one file's processing is caught
//! and logged; the worker moves on to the next file.

use crate::classify::{ClassifyError, Outcome};
use crate::intake::IntakeReceiver;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::Notify;

/// Turns one queued path into an outcome.
pub trait FileProcessor: Send + Sync + 'static {
    fn process(&self, path: &Path) -> Result<Outcome, ClassifyError>;
}

/// Tripped when a worker hits a fatal error; the daemon shuts down on it.
#[derive(Default)]
pub struct HaltSignal {
    tripped: AtomicBool,
    notify: Notify,
}

impl HaltSignal {
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Resolves once [`trip`](Self::trip) has been called.
    pub async fn tripped(&self) {
        if self.is_tripped() {
            return;
        }
        self.notify.notified().await;
    }
}

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start<P: FileProcessor>(
        count: usize,
        processor: Arc<P>,
        intake: Arc<IntakeReceiver>,
        halt: Arc<HaltSignal>,
    ) -> io::Result<Self> {
        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let processor = processor.clone();
            let intake = intake.clone();
            let halt = halt.clone();
            let handle = std::thread::Builder::new()
                .name(format!("photoroute-worker-{id}"))
                .spawn(move || worker_loop(id, processor.as_ref(), &intake, &halt))?;
            workers.push(handle);
        }
        tracing::info!(workers = count, "worker pool started");
        Ok(Self { workers })
    }

    /// Wait for every worker to exit. Workers exit when the queue closes or on halt.
    pub fn join(self) {
        for handle in self.workers {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

fn worker_loop<P: FileProcessor>(id: usize, processor: &P, intake: &IntakeReceiver, halt: &HaltSignal) {
    tracing::debug!(worker = id, "worker started");
    while let Some(path) = intake.next_blocking() {
        if halt.is_tripped() {
            intake.complete(&path);
            break;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| processor.process(&path)));
        intake.complete(&path);

        match result {
            Ok(Ok(outcome)) => tracing::debug!(worker = id, ?outcome, "file done"),
            Ok(Err(e)) if e.is_fatal() => {
                tracing::error!(worker = id, path = %path.display(), error = %e, "fatal error, halting intake");
                halt.trip();
                break;
            }
            Ok(Err(e)) => tracing::warn!(worker = id, path = %path.display(), error = %e, "file failed"),
            Err(_) => tracing::error!(worker = id, path = %path.display(), "panic while processing file"),
        }
    }
    tracing::debug!(worker = id, "worker exiting");
}
