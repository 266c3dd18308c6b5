//! Runs one packing task at a time on a worker thread.
//!
//! The caller owns the `TaskRunner` and drives it by polling: results and
//! status events are only applied on the caller's thread, in `poll`/`wait`.

use crate::error::{PackingError, Result};
use crate::model::{PackingTask, PlacedObject};
use crate::packer::Packer;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared between the caller and a strategy.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
    /// `Err(PackingError::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PackingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }
}

/// Status change of a task, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: Option<String>,
}

/// Final report of a task that finished on its own (never produced for a cancelled task).
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub result: Option<Vec<PlacedObject>>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

struct Finished {
    task_id: TaskId,
    result: std::result::Result<Result<Vec<PlacedObject>>, String>,
    elapsed: Duration,
}

struct ActiveTask {
    id: TaskId,
    name: String,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

pub struct TaskRunner {
    next_id: TaskId,
    status: TaskStatus,
    active: Option<ActiveTask>,
    tx: Sender<Finished>,
    rx: Receiver<Finished>,
    events: Vec<TaskEvent>,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            next_id: 1,
            status: TaskStatus::Pending,
            active: None,
            tx,
            rx,
            events: Vec::new(),
        }
    }

    /// Status of the most recently submitted task (`Pending` before the first one).
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Id of the submitted task whose final report has not been drained yet.
    pub fn current_task(&self) -> Option<TaskId> {
        self.active.as_ref().map(|t| t.id)
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Starts `packer` on `task` in a worker thread.
    ///
    /// Fails with `PackingError::Busy` while another task is running; nothing is started then.
    pub fn submit(
        &mut self,
        name: impl Into<String>,
        task: PackingTask,
        packer: Arc<dyn Packer>,
    ) -> Result<TaskId> {
        if self.is_running() {
            return Err(PackingError::Busy);
        }
        let name = name.into();
        let id = self.next_id;
        self.next_id += 1;
        self.emit(id, TaskStatus::Pending, None);

        let cancel = CancelToken::new();
        let token = cancel.clone();
        let tx = self.tx.clone();
        let handle = std::thread::Builder::new()
            .name(format!("pack-task-{id}"))
            .spawn(move || {
                let started = Instant::now();
                let result = catch_unwind(AssertUnwindSafe(|| packer.pack(&task, &token)))
                    .map_err(|panic| panic_message(panic.as_ref()));
                // the runner may be gone already
                let _ = tx.send(Finished {
                    task_id: id,
                    result,
                    elapsed: started.elapsed(),
                });
            })?;

        info!(task_id = id, name = %name, "task started");
        self.active = Some(ActiveTask {
            id,
            name,
            cancel,
            handle: Some(handle),
        });
        self.status = TaskStatus::Running;
        self.emit(id, TaskStatus::Running, None);
        Ok(id)
    }

    /// Cancels the running task. Its result will never be delivered.
    ///
    /// Returns false if no task is running.
    pub fn cancel(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        let Some(active) = self.active.as_ref() else {
            return false;
        };
        active.cancel.cancel();
        let id = active.id;
        self.status = TaskStatus::Cancelled;
        self.emit(id, TaskStatus::Cancelled, None);
        info!(task_id = id, "task cancelled");
        true
    }

    /// Drains finished work and returns the outcomes of tasks that completed or failed.
    pub fn poll(&mut self) -> Vec<TaskOutcome> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => out.extend(self.apply(msg)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Blocks up to `timeout` for the running task to finish.
    ///
    /// Returns `None` on timeout, when nothing is running, or when the task was cancelled.
    pub fn wait(&mut self, timeout: Duration) -> Option<TaskOutcome> {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(msg) => {
                    if let Some(outcome) = self.apply(msg) {
                        return Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
        None
    }

    /// Drains status events recorded since the last call.
    pub fn events(&mut self) -> Vec<TaskEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, task_id: TaskId, status: TaskStatus, message: Option<String>) {
        self.events.push(TaskEvent {
            task_id,
            status,
            message,
        });
    }

    fn apply(&mut self, msg: Finished) -> Option<TaskOutcome> {
        let is_current = self.active.as_ref().is_some_and(|a| a.id == msg.task_id);
        if !is_current {
            debug!(task_id = msg.task_id, "dropping result of a superseded task");
            return None;
        }
        let mut active = self.active.take()?;
        if let Some(handle) = active.handle.take() {
            if handle.join().is_err() {
                warn!(task_id = active.id, "worker thread panicked after reporting");
            }
        }
        if self.status != TaskStatus::Running {
            debug!(task_id = msg.task_id, "dropping result of a cancelled task");
            return None;
        }

        let (status, result, error) = match msg.result {
            Ok(Ok(placed)) => (TaskStatus::Completed, Some(placed), None),
            Ok(Err(PackingError::Cancelled)) => (TaskStatus::Cancelled, None, None),
            Ok(Err(e)) => (TaskStatus::Error, None, Some(e.to_string())),
            Err(panic) => (TaskStatus::Error, None, Some(format!("worker panicked: {panic}"))),
        };
        self.status = status;
        self.emit(active.id, status, error.clone());
        match status {
            TaskStatus::Completed => info!(
                task_id = active.id,
                placed = result.as_ref().map_or(0, |r| r.len()),
                elapsed_ms = msg.elapsed.as_millis() as u64,
                "task completed"
            ),
            TaskStatus::Cancelled => return None,
            _ => warn!(task_id = active.id, error = ?error, "task failed"),
        }
        Some(TaskOutcome {
            task_id: active.id,
            name: active.name,
            status,
            result,
            error,
            elapsed: msg.elapsed,
        })
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
