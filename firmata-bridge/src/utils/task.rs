//! Defines the task runner used for background work (handshake, report polling, notifications).
use std::future::Future;

use log::error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::errors::{Error, RuntimeError};

/// Represents the result of a task.
/// A task may return either () or Result<(), Error> for flexibility.
pub enum TaskResult {
    Ok,
    Err(Error),
}

/// Represents a handler to a running task.
pub type TaskHandler = JoinHandle<Result<(), Error>>;

impl From<Result<(), Error>> for TaskResult {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(_) => TaskResult::Ok,
            Err(e) => TaskResult::Err(e),
        }
    }
}

impl From<()> for TaskResult {
    fn from(_: ()) -> Self {
        TaskResult::Ok
    }
}

/// Runs a given future as a task on the ambient tokio runtime.
///
/// A failing task does not bring the runtime down: its error is logged and stored in the
/// returned handler.
///
/// # Errors
/// * `RuntimeError`: called outside a tokio runtime.
pub fn run<F, T>(future: F) -> Result<TaskHandler, Error>
where
    F: Future<Output = T> + Send + 'static,
    T: Into<TaskResult> + Send + 'static,
{
    let runtime = Handle::try_current().map_err(|_| RuntimeError)?;
    let handler = runtime.spawn(async move {
        match future.await.into() {
            TaskResult::Ok => Ok(()),
            TaskResult::Err(err) => {
                error!("Task failed: {}", err);
                Err(err)
            }
        }
    });
    Ok(handler)
}

#[macro_export]
macro_rules! pause {
    ($ms:expr) => {
        tokio::time::sleep(tokio::time::Duration::from_millis($ms as u64)).await
    };
}

#[macro_export]
macro_rules! pause_sync {
    ($ms:expr) => {
        std::thread::sleep(std::time::Duration::from_millis($ms as u64))
    };
}
