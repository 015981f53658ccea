//! Per-node single-writer coordination.
//!
//! Every OBM has exactly one controller context: the [`Coordinator::serve`]
//! loop. All console and control-plane operations are translated into events
//! sent to that loop and executed there one at a time, which rules out any
//! interleaving between "console is being dialed", "console is being
//! dropped", and control subprocess invocations for the same node.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

use crate::DriverError;

/// A live console "process" produced by a backend's [`dial`](ConsoleBackend::dial).
#[async_trait::async_trait]
pub trait Proc: Send {
    /// Take the console's read half. Called exactly once, immediately after
    /// a successful dial.
    fn take_reader(&mut self) -> Box<dyn AsyncRead + Send + Unpin>;

    /// Driver-specific graceful shutdown of the console session. Must leave
    /// nothing running; errors are reported to the caller for logging only.
    async fn shutdown(self: Box<Self>) -> Result<(), DriverError>;
}

/// The primitive console half of a driver, from which the coordinator
/// builds the console-related methods of an OBM.
#[async_trait::async_trait]
pub trait ConsoleBackend: Send + Sync + 'static {
    /// Connect to the console, returning the managing [`Proc`].
    async fn dial(&self) -> Result<Box<dyn Proc>, DriverError>;
}

/// A boxed control-plane step executed inside the serve loop.
type RunFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

enum Event {
    DialConsole {
        reply: oneshot::Sender<Result<Console, DriverError>>,
    },
    DropConsole {
        reply: oneshot::Sender<()>,
    },
    Run {
        fut: RunFuture,
    },
}

/// Serializes all operations against a single OBM.
///
/// Operations are accepted only while a task is executing [`serve`]; once
/// that loop exits (cancellation), every pending and subsequent request
/// resolves to [`DriverError::Canceled`] — no reply channel is left hanging.
///
/// [`serve`]: Coordinator::serve
pub struct Coordinator {
    backend: Arc<dyn ConsoleBackend>,
    events: mpsc::Sender<Event>,
    inbox: StdMutex<Option<mpsc::Receiver<Event>>>,
}

impl Coordinator {
    /// Create a coordinator over the given console backend. Nothing runs
    /// until [`serve`](Coordinator::serve) is started.
    pub fn new(backend: Arc<dyn ConsoleBackend>) -> Self {
        // Capacity 1: senders rendezvous with the loop, so event intake
        // preserves the program order of each issuing site.
        let (events, inbox) = mpsc::channel(1);
        Self {
            backend,
            events,
            inbox: StdMutex::new(Some(inbox)),
        }
    }

    /// The controller context: receives events and executes them one at a
    /// time until `cancel` flips (or its sender is dropped). Tears down any
    /// active console on the way out.
    pub async fn serve(&self, mut cancel: watch::Receiver<bool>) {
        let mut inbox = self
            .inbox
            .lock()
            .expect("coordinator inbox lock poisoned")
            .take()
            .expect("Coordinator::serve started twice");

        // The currently active console subprocess, if any.
        let mut proc: Option<Box<dyn Proc>> = None;

        // Back-channel for the currently delivered console's close signal.
        // One slot, and the loop keeps its own sender alive so `recv` never
        // observes a closed channel while idle. Replaced on every dial, so a
        // close from a stale console lands in an abandoned channel and is
        // ignored, exactly as intended.
        let (mut _gate_tx, mut gate_rx) = mpsc::channel::<()>(1);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    stop_process(&mut proc).await;
                    return;
                }
                _ = gate_rx.recv() => {
                    // The delivered console was closed by its consumer.
                    stop_process(&mut proc).await;
                }
                ev = inbox.recv() => match ev {
                    None => {
                        // Every handle is gone; nothing can reach us again.
                        stop_process(&mut proc).await;
                        return;
                    }
                    Some(Event::DropConsole { reply }) => {
                        stop_process(&mut proc).await;
                        let _ = reply.send(());
                    }
                    Some(Event::DialConsole { reply }) => {
                        stop_process(&mut proc).await;
                        match self.backend.dial().await {
                            Err(e) => {
                                let _ = reply.send(Err(e));
                            }
                            Ok(mut p) => {
                                let (tx, rx) = mpsc::channel(1);
                                let console = Console {
                                    reader: p.take_reader(),
                                    gate: tx.clone(),
                                    fired: false,
                                };
                                _gate_tx = tx;
                                gate_rx = rx;
                                proc = Some(p);
                                let _ = reply.send(Ok(console));
                            }
                        }
                    }
                    Some(Event::Run { fut }) => fut.await,
                },
            }
        }
    }

    /// Connect to the console, tearing down any existing session first.
    pub async fn dial_console(&self) -> Result<Console, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Event::DialConsole { reply })
            .await
            .map_err(|_| DriverError::Canceled)?;
        rx.await.map_err(|_| DriverError::Canceled)?
    }

    /// Disconnect the current console session, if any. Always succeeds when
    /// the loop is running; idempotent.
    pub async fn drop_console(&self) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Event::DropConsole { reply })
            .await
            .map_err(|_| DriverError::Canceled)?;
        rx.await.map_err(|_| DriverError::Canceled)
    }

    /// Execute `f` inside the serve loop, serialized against every other
    /// console and control operation for this node. Two concurrent calls are
    /// executed back to back, never interleaved.
    pub async fn run<T, F, Fut>(&self, f: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let fut: RunFuture = Box::pin(async move {
            let _ = reply.send(f().await);
        });
        self.events
            .send(Event::Run { fut })
            .await
            .map_err(|_| DriverError::Canceled)?;
        rx.await.map_err(|_| DriverError::Canceled)
    }
}

/// Shut down the active console process, if any. Teardown must succeed from
/// the caller's perspective: failures are logged and the slot is cleared.
async fn stop_process(proc: &mut Option<Box<dyn Proc>>) {
    if let Some(p) = proc.take() {
        if let Err(e) = p.shutdown().await {
            warn!(%e, "error shutting down console process; continuing");
        }
    }
}

/// A console stream delivered by [`Coordinator::dial_console`].
///
/// Closing (or dropping) the console posts a close signal back to the
/// coordinator, which tears the underlying process down if this console is
/// still the current one. The signal goes through a one-slot buffer gated by
/// an "already fired" flag, so `close` can be called any number of times,
/// from anywhere, without ever blocking.
pub struct Console {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    gate: mpsc::Sender<()>,
    fired: bool,
}

impl Console {
    /// Signal the coordinator that this consumer is done. Idempotent.
    pub fn close(&mut self) {
        if !self.fired {
            self.fired = true;
            let _ = self.gate.try_send(());
        }
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.close();
    }
}

impl AsyncRead for Console {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}
