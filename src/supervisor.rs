//! Supervisor for the single tunnel agent instance
//!
//! The agent runs an internal web API and must be spawned only once; a
//! respawn is allowed after the process exits or a start attempt fails.
//! Concurrent callers of [`Supervisor::get_endpoint`] are coordinated into
//! one shared start attempt: the attempt future is stored in the supervisor
//! state before any suspension point, so two near-simultaneous requests can
//! never race into spawning two processes.

use crate::error::{truncate_output, Error, Result};
use crate::matcher::{classify, ReadinessEvent};
use crate::options::Options;
use crate::process::AgentProcess;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Memoized in-flight or completed start attempt, awaited by every caller
type StartAttempt = Shared<BoxFuture<'static, Result<String>>>;

/// One chunk of output from the supervised process
enum Chunk {
    Out(String),
    Err(String),
}

/// Handle to the process once it has been retained as active
struct ActiveAgent {
    pid: Option<u32>,
    /// Consumed by the first `shutdown` call
    kill: Option<oneshot::Sender<()>>,
    /// Flips to true when the exit notification fires
    exited: watch::Receiver<bool>,
}

#[derive(Default)]
struct Inner {
    attempt: Option<StartAttempt>,
    active: Option<ActiveAgent>,
}

/// Supervises at most one tunnel agent process at a time.
///
/// Cloning is cheap and yields a handle to the same supervised instance.
#[derive(Clone, Default)]
pub struct Supervisor {
    inner: Arc<Mutex<Inner>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the agent's internal web API URL, starting the agent if needed.
    ///
    /// Memoized: while a start attempt is pending, or after one has
    /// succeeded and the process is still alive, every call observes the
    /// same attempt without spawning. A failed attempt clears the cache so
    /// the next call retries with a fresh process.
    pub async fn get_endpoint(&self, options: &Options) -> Result<String> {
        let attempt = {
            let mut inner = self.inner.lock().await;
            match &inner.attempt {
                Some(existing) => existing.clone(),
                None => {
                    let attempt = Self::start(options.clone(), Arc::clone(&self.inner))
                        .boxed()
                        .shared();
                    inner.attempt = Some(attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Drive one start attempt to its first readiness or failure signal
    async fn start(options: Options, inner: Arc<Mutex<Inner>>) -> Result<String> {
        let dir = options.working_dir();
        let args = options.start_args();
        info!("Starting tunnel agent in {:?}", dir);

        let (mut agent, stdout, stderr) = match AgentProcess::spawn(&dir, &args) {
            Ok(spawned) => spawned,
            Err(e) => {
                inner.lock().await.attempt = None;
                return Err(e);
            }
        };

        // Forward both streams into one channel, mirroring per-chunk
        // data listeners. The reader tasks end when the pipes close or
        // when the receiver is dropped.
        let (tx, mut rx) = mpsc::channel::<Chunk>(16);
        let out_reader = spawn_reader(stdout, tx.clone(), Chunk::Out);
        let err_reader = spawn_reader(stderr, tx, Chunk::Err);

        let outcome = loop {
            tokio::select! {
                status = agent.wait() => {
                    // The exit can race chunks still buffered in the
                    // channel or in the closing pipes. The readers hit EOF
                    // and close the channel, so draining terminates; a
                    // signal found there still wins over the exit.
                    match drain_for_signal(&mut rx).await {
                        Some(outcome) => break outcome,
                        None => break Err(Error::Process(format!(
                            "agent exited before becoming ready ({})",
                            describe_exit(&status)
                        ))),
                    }
                }
                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        if let Some(outcome) = classify_chunk(chunk) {
                            break outcome;
                        }
                    }
                    None => {
                        // Both pipes closed without a signal; the process
                        // is gone or about to be
                        let status = agent.wait().await;
                        break Err(Error::Process(format!(
                            "agent closed its output before becoming ready ({})",
                            describe_exit(&status)
                        )));
                    }
                },
            }
        };

        match outcome {
            Ok(url) => {
                let (kill_tx, kill_rx) = oneshot::channel();
                let (exited_tx, exited_rx) = watch::channel(false);
                {
                    let mut guard = inner.lock().await;
                    guard.active = Some(ActiveAgent {
                        pid: agent.id(),
                        kill: Some(kill_tx),
                        exited: exited_rx,
                    });
                }

                // Detach from readiness handling: later chunks are only
                // drained to the log, never re-classified
                tokio::spawn(async move {
                    while let Some(chunk) = rx.recv().await {
                        match chunk {
                            Chunk::Out(text) => debug!("agent: {}", text.trim_end()),
                            Chunk::Err(text) => debug!("agent stderr: {}", text.trim_end()),
                        }
                    }
                });
                tokio::spawn(monitor(agent, kill_rx, exited_tx, inner));

                info!("Tunnel agent ready at {}", url);
                Ok(url)
            }
            Err(e) => {
                warn!("Tunnel agent failed to start: {}", e);
                // May fail harmlessly when the process already exited
                if let Err(kill_err) = agent.kill().await {
                    debug!("Kill after start failure: {}", kill_err);
                }
                out_reader.abort();
                err_reader.abort();
                inner.lock().await.attempt = None;
                Err(e)
            }
        }
    }

    /// Terminate the active process, completing once the exit notification
    /// has fired. A no-op when no process is active.
    pub async fn shutdown(&self) {
        let (kill, mut exited) = {
            let mut inner = self.inner.lock().await;
            match inner.active.as_mut() {
                None => {
                    debug!("Shutdown requested with no active agent");
                    return;
                }
                Some(active) => (active.kill.take(), active.exited.clone()),
            }
        };

        if let Some(kill) = kill {
            info!("Shutting down tunnel agent...");
            let _ = kill.send(());
        }

        while !*exited.borrow_and_update() {
            if exited.changed().await.is_err() {
                break;
            }
        }
        info!("Tunnel agent shut down");
    }

    /// PID of the active process, if one is currently retained
    pub async fn active_pid(&self) -> Option<u32> {
        self.inner.lock().await.active.as_ref().and_then(|a| a.pid)
    }

    /// Whether a process is currently retained as active
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.active.is_some()
    }
}

/// Own the process until it terminates, for any reason, then clear the
/// shared state so a later `get_endpoint` starts fresh.
async fn monitor(
    mut agent: AgentProcess,
    kill_rx: oneshot::Receiver<()>,
    exited_tx: watch::Sender<bool>,
    inner: Arc<Mutex<Inner>>,
) {
    let status = tokio::select! {
        status = agent.wait() => status,
        // Fires on an explicit shutdown, or when the supervisor itself is
        // dropped and the kill sender goes with it
        _ = kill_rx => {
            if let Err(e) = agent.start_kill() {
                warn!("Failed to kill tunnel agent: {}", e);
            }
            agent.wait().await
        }
    };

    info!("Tunnel agent exited with {}", describe_exit(&status));

    {
        let mut guard = inner.lock().await;
        guard.attempt = None;
        guard.active = None;
    }
    let _ = exited_tx.send(true);
}

/// Register a best-effort host-shutdown hook: on Ctrl-C the supervisor's
/// `shutdown` runs so the agent process is not leaked by an exiting host.
pub fn on_host_shutdown(supervisor: &Supervisor) -> JoinHandle<()> {
    let supervisor = supervisor.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        supervisor.shutdown().await;
    })
}

/// Map one output chunk to the attempt outcome it settles, if any
fn classify_chunk(chunk: Chunk) -> Option<Result<String>> {
    match chunk {
        Chunk::Out(text) => {
            debug!("agent: {}", text.trim_end());
            match classify(&text) {
                Some(ReadinessEvent::Ready(addr)) => Some(Ok(format!("http://{}", addr))),
                Some(ReadinessEvent::AddressInUse) => {
                    Some(Err(Error::AddressInUse(truncate_output(&text))))
                }
                None => None,
            }
        }
        Chunk::Err(text) => {
            warn!("agent stderr: {}", text.trim_end());
            Some(Err(Error::Process(truncate_output(&text))))
        }
    }
}

/// Classify whatever is left in the channel after the process has exited.
/// Ends when the reader tasks close the channel on pipe EOF.
async fn drain_for_signal(rx: &mut mpsc::Receiver<Chunk>) -> Option<Result<String>> {
    while let Some(chunk) = rx.recv().await {
        if let Some(outcome) = classify_chunk(chunk) {
            return Some(outcome);
        }
    }
    None
}

/// Read one stream chunk-by-chunk into the shared channel
fn spawn_reader<R>(
    mut stream: R,
    tx: mpsc::Sender<Chunk>,
    wrap: fn(String) -> Chunk,
) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(wrap(text)).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn describe_exit(status: &std::io::Result<std::process::ExitStatus>) -> String {
    match status {
        Ok(status) => status.to_string(),
        Err(e) => format!("unknown status: {}", e),
    }
}
