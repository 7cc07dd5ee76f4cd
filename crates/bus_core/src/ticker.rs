//! Cancellable repeating task: one named thread per running simulation.
//!
//! The thread sleeps on a channel with a timeout of one interval, so
//! [`CancelToken::cancel`] wakes it immediately instead of waiting out the
//! current sleep.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Whether the tick callback wants to keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    waker: Mutex<Option<Sender<()>>>,
}

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut waker) = self.inner.waker.lock() {
            if let Some(tx) = waker.take() {
                let _ = tx.send(());
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn install_waker(&self) -> Receiver<()> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut waker) = self.inner.waker.lock() {
            *waker = Some(tx);
        }
        rx
    }
}

/// Handle to a running tick thread. Dropping it detaches the thread; cancel
/// the token to end it.
#[derive(Debug)]
pub struct Ticker {
    token: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Call `on_tick` every `interval` until it returns [`TickControl::Stop`]
    /// or `token` is cancelled. The first call happens one interval after
    /// spawning.
    pub fn spawn<F>(
        name: String,
        interval: Duration,
        token: CancelToken,
        mut on_tick: F,
    ) -> io::Result<Self>
    where
        F: FnMut() -> TickControl + Send + 'static,
    {
        let wake = token.install_waker();
        let thread_token = token.clone();
        let handle = thread::Builder::new().name(name).spawn(move || loop {
            match wake.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if thread_token.is_cancelled() {
                break;
            }
            if on_tick() == TickControl::Stop {
                break;
            }
        })?;
        Ok(Self {
            token,
            handle: Some(handle),
        })
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the thread to exit.
    pub fn join(mut self) -> thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}
