//! Named background task registry.
//!
//! Ported from `aicc_pipeline/core/task_registry.py`'s `TaskRegistry`, per
//! REDESIGN FLAGS §9 ("fire-and-forget `tokio::spawn` calls should register
//! with a tracked registry instead"). Every long-lived background task the
//! pipeline controller spawns (UDP receivers excepted — they own their own
//! `JoinHandle`, per `udp::UdpReceiver`) is registered here under a name, so
//! a panicking or silently-exiting task is observable instead of vanishing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

struct Entry {
    handle: JoinHandle<()>,
}

/// Tracks named background tasks and whether they completed or failed.
///
/// Grounded on the Python registry's `register`/`_on_task_complete`/
/// `shutdown` shape, replacing the `asyncio.Task.add_done_callback` pattern
/// with a `JoinHandle` plus an explicit failure set updated once a task is
/// reaped (there is no direct Rust analogue to `add_done_callback` that
/// runs synchronously on the executor, so failures are observed lazily, on
/// `reap_finished`/`shutdown`, which matches the Python registry's own
/// eventual-consistency: `active_count` there is also only accurate after
/// the event loop has had a chance to run pending callbacks).
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Entry>>,
    failed: Mutex<Vec<String>>,
    completed_count: std::sync::atomic::AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawns `fut` under `name`, tracking it for later inspection. A
    /// duplicate name aborts and replaces the previous task under that
    /// name, matching the Python registry's `register()` (which overwrites
    /// a stale entry rather than refusing the new one).
    pub fn spawn<F>(self: &Arc<Self>, name: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(fut);

        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.insert(name.clone(), Entry { handle }) {
            tracing::warn!(task = %name, "replacing task already registered under this name");
            previous.handle.abort();
        }
    }

    /// Spawns a fallible task; a returned `Err` is logged and the task name
    /// is recorded as failed.
    pub fn spawn_fallible<F>(self: &Arc<Self>, name: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let name = name.into();
        let registry = self.clone();
        let tracked_name = name.clone();
        self.spawn(name, async move {
            match fut.await {
                Ok(()) => registry.completed_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
                Err(err) => {
                    tracing::error!(task = %tracked_name, error = %err, "background task failed");
                    registry.failed.lock().push(tracked_name);
                    0
                }
            };
        });
    }

    /// Drops `JoinHandle`s for tasks that have already finished, moving any
    /// that panicked into the failed list. Awaiting an already-finished
    /// handle resolves immediately, so this never blocks.
    pub async fn reap_finished(&self) {
        let finished: Vec<(String, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock();
            let names: Vec<String> = tasks
                .iter()
                .filter(|(_, entry)| entry.handle.is_finished())
                .map(|(name, _)| name.clone())
                .collect();
            names.into_iter().filter_map(|name| tasks.remove(&name).map(|e| (name, e.handle))).collect()
        };

        for (name, handle) in finished {
            match handle.await {
                Ok(()) => {
                    self.completed_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Err(join_err) => {
                    tracing::error!(task = %name, error = %join_err, "background task panicked");
                    self.failed.lock().push(name);
                }
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.lock().len()
    }

    pub fn completed_count(&self) -> u64 {
        self.completed_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn cancel(&self, name: &str) {
        if let Some(entry) = self.tasks.lock().remove(name) {
            entry.handle.abort();
        }
    }

    /// Aborts every remaining task and waits up to `timeout` for them to
    /// unwind, matching the Python registry's `shutdown(timeout=5.0)`.
    pub async fn shutdown(&self, timeout: Duration) {
        let entries: Vec<(String, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock();
            tasks.drain().map(|(name, entry)| (name, entry.handle)).collect()
        };

        let names: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
        let join_all = futures_util::future::join_all(entries.into_iter().map(|(_, handle)| handle));

        if tokio::time::timeout(timeout, join_all).await.is_err() {
            tracing::warn!(tasks = ?names, timeout_secs = timeout.as_secs_f32(), "task registry shutdown timed out, some tasks may still be unwinding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn spawn_tracks_active_task() {
        let registry = TaskRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        registry.spawn("wait-forever", async move {
            let _ = rx.await;
        });
        assert_eq!(registry.active_count(), 1);
        let _ = tx.send(());
    }

    #[tokio::test]
    async fn duplicate_name_aborts_previous_task() {
        let registry = TaskRegistry::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        registry.spawn("dup", async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            ran_clone.store(true, Ordering::Relaxed);
        });
        registry.spawn("dup", async {});
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_waits_for_tasks_to_finish() {
        let registry = TaskRegistry::new();
        registry.spawn("quick", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        registry.shutdown(Duration::from_secs(1)).await;
        assert_eq!(registry.active_count(), 0);
    }
}
