//! Cross-thread async execution bridge
//!
//! One dedicated worker thread runs a single-threaded tokio runtime for the
//! lifetime of the process. Synchronous callers hand futures to it with
//! [`AsyncBridge::schedule`] and may block on the returned [`TaskHandle`];
//! only the calling thread blocks, the worker keeps interleaving every other
//! task. Futures running on the worker can `tokio::spawn` sub-tasks, which are
//! multiplexed cooperatively on the same thread.
//!
//! Never call [`TaskHandle::await_result`] from inside a bridge task: the
//! worker would block on itself.

use crate::error::{Error, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, sync_channel};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to the single cooperative worker thread
pub struct AsyncBridge {
    sender: Mutex<Option<UnboundedSender<BoxedTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl AsyncBridge {
    /// Start the worker thread and its runtime
    ///
    /// # Errors
    /// Returns error if the thread cannot be spawned or the runtime cannot be built
    pub fn start(name: &str) -> Result<Self> {
        let (sender, mut receiver) = unbounded_channel::<BoxedTask>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::io::Result<()>>();

        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Built and dropped on this thread so the runtime never
                // shuts down inside another runtime's context
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => {
                        ready_tx.send(Ok(())).ok();
                        runtime
                    }
                    Err(e) => {
                        ready_tx.send(Err(e)).ok();
                        return;
                    }
                };

                runtime.block_on(async move {
                    while let Some(task) = receiver.recv().await {
                        tokio::spawn(task);
                    }
                });
                debug!("bridge scheduler loop ended");
            })?;

        ready_rx.recv().map_err(|_| Error::BridgeStopped)??;

        let worker_id = worker.thread().id();
        info!(thread = name, "async bridge started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    /// Enqueue a future onto the worker and return immediately
    ///
    /// Errors returned by the future, and panics inside it, are delivered
    /// through the handle; they never take down the worker. If the bridge has
    /// been stopped the handle resolves to [`Error::BridgeStopped`].
    pub fn schedule<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = sync_channel(1);

        let wrapped = async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(error = %message, "bridge task panicked");
                    Err(Error::TaskPanicked(message))
                }
            };
            // The caller may have stopped waiting
            result_tx.send(outcome).ok();
        };

        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match sender.as_ref() {
            // A rejected task is dropped with its result sender, so the
            // handle observes a disconnect and reports BridgeStopped
            Some(tx) => {
                tx.send(Box::pin(wrapped)).ok();
            }
            None => drop(wrapped),
        }

        TaskHandle {
            receiver: result_rx,
        }
    }

    /// Whether the bridge still accepts tasks
    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// True when called from the worker thread itself
    pub fn on_worker_thread(&self) -> bool {
        std::thread::current().id() == self.worker_id
    }

    /// Stop accepting tasks, end the scheduler loop and join the worker
    ///
    /// Tasks still pending when the loop ends are dropped; their handles
    /// resolve to [`Error::BridgeStopped`].
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if self.on_worker_thread() {
                // Joining ourselves would deadlock; the loop ends on its own
                warn!("bridge shutdown requested from worker thread, not joining");
                return;
            }
            if worker.join().is_err() {
                warn!("bridge worker thread panicked during shutdown");
            }
        }
        info!("async bridge stopped");
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Result handle for a task scheduled on the bridge
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block the calling thread until the task finishes or `timeout` elapses
    ///
    /// A timeout only ends the wait; the task keeps running and the handle can
    /// be waited on again.
    pub fn await_result(&self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(Error::BridgeStopped),
        }
    }

    /// Non-blocking check; `None` while the task is still running
    pub fn try_result(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::BridgeStopped)),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
