use std::{collections::HashMap, future::Future, sync::Mutex, time::Duration};

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned background job and the signal that stops it.
pub struct TaskHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Named background jobs (fulfilments, reminders, watchers). All of them
/// hang off one root token, so shutdown stops every job deterministically.
pub struct Tasks {
    root: CancellationToken,
    handles: Mutex<HashMap<String, TaskHandle>>,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Spawns `f` under `name`. Returns `false` without spawning when a task
    /// with that name is still running or shutdown has begun.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if self.root.is_cancelled() {
            warn!("Task {} not started: shutting down", name);
            return false;
        }

        let Ok(mut handles) = self.handles.lock() else {
            return false;
        };
        handles.retain(|_, h| !h.is_finished());

        if handles.contains_key(&name) {
            debug!("Task {} is already running", name);
            return false;
        }

        let cancel = self.root.child_token();
        let handle = tokio::spawn(f(cancel.clone()));
        handles.insert(name, TaskHandle { handle, cancel });
        true
    }

    pub fn cancel(&self, name: &str) -> bool {
        let Ok(mut handles) = self.handles.lock() else {
            return false;
        };
        match handles.remove(name) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.handles
            .lock()
            .map(|handles| handles.get(name).map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Waits for the task `name` to finish. Returns `false` if there is none.
    pub async fn join(&self, name: &str) -> bool {
        let task = match self.handles.lock() {
            Ok(mut handles) => handles.remove(name),
            Err(_) => None,
        };

        match task {
            Some(task) => {
                if let Err(e) = task.handle.await {
                    warn!("Task {} ended abnormally: {}", name, e);
                }
                true
            }
            None => false,
        }
    }

    /// Cancels every task and waits up to `grace` for each to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        self.root.cancel();

        let drained: Vec<(String, TaskHandle)> = match self.handles.lock() {
            Ok(mut handles) => handles.drain().collect(),
            Err(_) => vec![],
        };

        info!("Stopping {} background tasks", drained.len());
        for (name, task) in drained {
            match tokio::time::timeout(grace, task.handle).await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => warn!("Task {} ended abnormally: {}", name, e),
                Err(_) => warn!("Task {} did not stop in {:?}", name, grace),
            }
        }
    }
}
