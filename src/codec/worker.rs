//! Worker context shared by the four codec front-ends.
//!
//! Each encoder or decoder owns one dedicated thread named `avpipe-<role>`.
//! Submissions travel over an unbounded channel, so `encode`/`decode` never
//! block the caller; the thread processes them strictly in order and
//! delivers every listener callback for that instance. Flushes are
//! acknowledged once all earlier work has been delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{AvError, Result};

/// Lifecycle operations common to every codec front-end.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Short name used for the worker thread and in logs.
    fn role(&self) -> &'static str;

    /// Resolves once everything submitted so far, including output the
    /// session was still holding, has been delivered to the listener.
    ///
    /// Must not be awaited from inside a listener callback of the same
    /// instance: the callback runs on the worker that would complete it.
    async fn flush(&self) -> Result<()>;

    /// Flushes, releases the session and joins the worker. Later
    /// submissions fail with [`AvError::Closed`].
    fn stop(&self);

    /// False once a fatal error was reported or the instance was stopped.
    fn is_usable(&self) -> bool;
}

/// The per-instance state machine driven by the worker thread.
pub(crate) trait WorkerTask: Send + 'static {
    type Input: Send + 'static;

    fn process(&mut self, input: Self::Input);

    /// Drains output the session is still holding.
    fn flush(&mut self);

    /// Releases the session. Runs once, on the worker, after a final flush.
    fn shutdown(&mut self);
}

enum Command<I> {
    Submit(I),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Terminal-state tracking shared between a front-end and its worker.
#[derive(Debug, Default)]
pub(crate) struct Health {
    fatal: Mutex<Option<String>>,
}

impl Health {
    pub(crate) fn check(&self) -> Result<()> {
        match self.fatal.lock().as_ref() {
            Some(reason) => Err(AvError::Unusable(reason.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn is_fatal(&self) -> bool {
        self.fatal.lock().is_some()
    }

    /// Records the first fatal error; later ones are ignored.
    pub(crate) fn mark_fatal(&self, error: &AvError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error.to_string());
        }
    }
}

pub(crate) struct Worker<I> {
    role: &'static str,
    tx: Mutex<Option<mpsc::UnboundedSender<Command<I>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<I: Send + 'static> Worker<I> {
    pub(crate) fn spawn<T>(role: &'static str, mut task: T) -> Result<Self>
    where
        T: WorkerTask<Input = I>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command<I>>();

        let thread = thread::Builder::new()
            .name(format!("avpipe-{}", role))
            .spawn(move || {
                while let Some(command) = rx.blocking_recv() {
                    match command {
                        Command::Submit(input) => task.process(input),
                        Command::Flush(ack) => {
                            task.flush();
                            let _ = ack.send(());
                        }
                        Command::Shutdown => break,
                    }
                }
                task.flush();
                task.shutdown();
                log::debug!("{} worker exiting", role);
            })
            .map_err(|e| AvError::SessionCreation(format!("spawning {} worker: {}", role, e)))?;

        Ok(Self {
            role,
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
            stopped: AtomicBool::new(false),
        })
    }

    pub(crate) fn role(&self) -> &'static str {
        self.role
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn submit(&self, input: I) -> Result<()> {
        self.send(Command::Submit(input))
    }

    pub(crate) async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush(ack))?;
        done.await.map_err(|_| AvError::Closed)
    }

    /// Drains pending work, releases the session and joins the thread.
    /// Called from the worker itself (a listener dropping its codec), the
    /// join is skipped and the thread exits after the current callback.
    pub(crate) fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(Command::Shutdown);
        }

        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("{} worker panicked", self.role);
        }
        log::info!("{} stopped", self.role);
    }

    fn send(&self, command: Command<I>) -> Result<()> {
        let tx = self.tx.lock();
        let tx = tx.as_ref().ok_or(AvError::Closed)?;
        tx.send(command).map_err(|_| AvError::Closed)
    }
}

impl<I> Drop for Worker<I> {
    fn drop(&mut self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.tx.get_mut().take() {
            let _ = tx.send(Command::Shutdown);
        }
        if let Some(handle) = self.thread.get_mut().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("{} worker panicked", self.role);
            }
        }
    }
}
