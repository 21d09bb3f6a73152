//! Tracking of best-effort work that outlives the response.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Spawned cache writes and revalidations.
///
/// Tasks keep running when the requester goes away; `settle` waits for all
/// of them, which is what a host does before it lets the worker sleep.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task and remember it.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait until every tracked task has finished.
    pub async fn settle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.handles.lock().await);
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::error!("background cache task failed: {e}");
                }
            }
        }
    }

    /// Number of tasks not yet observed as finished.
    pub async fn pending(&self) -> usize {
        let handles = self.handles.lock().await;
        handles.iter().filter(|h| !h.is_finished()).count()
    }
}
