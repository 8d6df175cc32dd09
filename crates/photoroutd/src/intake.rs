//! Intake queue fed by a backlog scan and a debounced folder watcher.

use notify_debouncer_mini::notify::{self, RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use photoroute_core::is_image_path;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

type Pending = Arc<Mutex<HashSet<PathBuf>>>;

/// Producer side. Cheap to clone; the queue closes when every clone is dropped.
#[derive(Clone)]
pub struct IntakeQueue {
    tx: mpsc::UnboundedSender<PathBuf>,
    pending: Pending,
}

/// Consumer side, shared by all workers.
pub struct IntakeReceiver {
    rx: Mutex<mpsc::UnboundedReceiver<PathBuf>>,
    pending: Pending,
}

pub fn channel() -> (IntakeQueue, IntakeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Pending::default();
    (
        IntakeQueue {
            tx,
            pending: pending.clone(),
        },
        IntakeReceiver {
            rx: Mutex::new(rx),
            pending,
        },
    )
}

impl IntakeQueue {
    /// Queue a photo unless it is already waiting or being processed.
    ///
    /// Returns whether the path was queued.
    pub fn enqueue(&self, path: PathBuf) -> bool {
        if !is_image_path(&path) {
            tracing::trace!(path = %path.display(), "ignoring non-image file");
            return false;
        }
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(path.clone()) {
            tracing::debug!(path = %path.display(), "already queued");
            return false;
        }
        if self.tx.send(path.clone()).is_err() {
            pending.remove(&path);
            tracing::warn!(path = %path.display(), "intake closed, dropping file");
            return false;
        }
        tracing::debug!(path = %path.display(), "queued");
        true
    }
}

impl IntakeReceiver {
    /// Block until a path is available. `None` once the queue is closed and drained.
    pub fn next_blocking(&self) -> Option<PathBuf> {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        rx.blocking_recv()
    }

    /// Release a path so later events for it are queued again.
    pub fn complete(&self, path: &Path) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    #[cfg(test)]
    fn try_next(&self) -> Option<PathBuf> {
        self.rx.lock().ok()?.try_recv().ok()
    }
}

/// Queue every photo already sitting in `dir`, in name order.
pub fn scan_backlog(dir: &Path, queue: &IntakeQueue) -> io::Result<usize> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_image_path(p))
        .collect();
    files.sort();

    let queued = files.into_iter().filter(|p| queue.enqueue(p.clone())).count();
    tracing::info!(dir = %dir.display(), queued, "backlog scanned");
    Ok(queued)
}

/// Watches the intake directory (non-recursively) and queues settled files.
pub struct IntakeWatcher {
    debouncer: Debouncer<RecommendedWatcher>,
}

impl IntakeWatcher {
    pub fn start(dir: &Path, queue: IntakeQueue, debounce: Duration) -> Result<Self, notify::Error> {
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    // removals and our own deletes also produce events
                    if event.path.is_file() {
                        queue.enqueue(event.path);
                    }
                }
            }
            Err(e) => tracing::warn!(error = ?e, "watch error"),
        })?;
        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!(dir = %dir.display(), debounce_ms = debounce.as_millis() as u64, "watching intake");
        Ok(Self { debouncer })
    }

    /// Stop watching. Drops the watcher's queue handle.
    pub fn stop(self) {
        drop(self.debouncer);
        tracing::info!("intake watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn test_enqueue_filters_and_dedupes() {
        let (queue, intake) = channel();
        assert!(queue.enqueue(PathBuf::from("/in/a.JPG")));
        assert!(!queue.enqueue(PathBuf::from("/in/a.JPG")));
        assert!(!queue.enqueue(PathBuf::from("/in/notes.txt")));
        assert!(queue.enqueue(PathBuf::from("/in/b.png")));

        assert_eq!(intake.try_next(), Some(PathBuf::from("/in/a.JPG")));
        assert_eq!(intake.try_next(), Some(PathBuf::from("/in/b.png")));
        assert_eq!(intake.try_next(), None);
    }

    #[test]
    fn test_complete_allows_requeue() {
        let (queue, intake) = channel();
        let path = PathBuf::from("/in/a.jpg");
        assert!(queue.enqueue(path.clone()));
        let got = intake.next_blocking().unwrap();
        assert!(!queue.enqueue(path.clone()));
        intake.complete(&got);
        assert!(queue.enqueue(path));
    }

    #[test]
    fn test_closed_after_producers_drop() {
        let (queue, intake) = channel();
        queue.enqueue(PathBuf::from("/in/last.jpg"));
        drop(queue);
        assert_eq!(intake.next_blocking(), Some(PathBuf::from("/in/last.jpg")));
        assert_eq!(intake.next_blocking(), None);
    }

    #[test]
    fn test_backlog_sorted_images_only() {
        let dir = TempDir::new().unwrap();
        for name in ["c.jpg", "a.png", "b.jpeg", "readme.md"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let (queue, intake) = channel();
        assert_eq!(scan_backlog(dir.path(), &queue).unwrap(), 3);
        let order: Vec<_> = std::iter::from_fn(|| intake.try_next())
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, vec!["a.png", "b.jpeg", "c.jpg"]);
    }

    #[test]
    fn test_watcher_queues_new_file() {
        let dir = TempDir::new().unwrap();
        let (queue, intake) = channel();
        let watcher = IntakeWatcher::start(dir.path(), queue, Duration::from_millis(50)).unwrap();

        let path = dir.path().join("fresh.jpg");
        fs::write(&path, b"jpeg bytes").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = None;
        while seen.is_none() && Instant::now() < deadline {
            seen = intake.try_next();
            std::thread::sleep(Duration::from_millis(20));
        }
        watcher.stop();

        let seen = seen.expect("watcher never delivered the file");
        assert_eq!(seen.file_name(), path.file_name());
    }
}
