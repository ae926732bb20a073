//! Background job dispatch.
//! Work runs off the UI thread on the shared runtime; results come back
//! as exactly one typed message over mpsc.

use std::future::Future;
use std::sync::mpsc::Sender;

use tokio::runtime::Handle;

/// Spawns background work and delivers its result to the UI thread.
///
/// Cloneable handle; all clones target the same runtime. Jobs carry no
/// retry, timeout, or cancellation of their own.
#[derive(Clone)]
pub struct JobRunner {
    handle: Handle,
}

impl JobRunner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Run `future` on the runtime and send its output, mapped through
    /// `into_message`, on `tx`. Sends exactly one message per job.
    pub fn spawn<F, R, M>(
        &self,
        future: F,
        tx: &Sender<M>,
        into_message: impl FnOnce(R) -> M + Send + 'static,
    ) where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
        M: Send + 'static,
    {
        let tx = tx.clone();
        self.handle.spawn(async move {
            let result = future.await;
            if tx.send(into_message(result)).is_err() {
                tracing::debug!("job finished after its receiver was dropped");
            }
        });
    }

    /// Like [`spawn`](Self::spawn), for blocking work.
    pub fn spawn_blocking<R, M>(
        &self,
        work: impl FnOnce() -> R + Send + 'static,
        tx: &Sender<M>,
        into_message: impl FnOnce(R) -> M + Send + 'static,
    ) where
        R: Send + 'static,
        M: Send + 'static,
    {
        let tx = tx.clone();
        self.handle.spawn_blocking(move || {
            let result = work();
            if tx.send(into_message(result)).is_err() {
                tracing::debug!("blocking job finished after its receiver was dropped");
            }
        });
    }

    /// Fire-and-forget spawn for work with no result to report. The
    /// future is responsible for logging its own failures.
    pub fn spawn_detached<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
