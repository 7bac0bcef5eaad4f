//! Child process supervision and stream forwarding.
//!
//! One supervising future owns the [`Child`] handle for exit and signal
//! coordination. Three forwarding futures run alongside it:
//! - **stdin pump**: relay stdin → child stdin, byte-for-byte;
//! - **stdout loop**: child stdout → line splitter → classifier → relay
//!   stdout (protocol) or relay stderr (tagged diagnostics);
//! - **stderr loop**: child stderr → relay stderr, unchanged.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nx_domain::config::RelayConfig;
use nx_domain::trace::TraceEvent;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::classify::{classify_line, LineClass};
use crate::lines::LineSplitter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors that can occur while spawning or supervising the child.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to capture child {0}")]
    Pipe(&'static str),

    #[error("relay I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Process exit code the relay should terminate with.
    ///
    /// Follows the shell convention: 127 for a missing executable,
    /// 126 for one that cannot be executed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Spawn { source, .. } => match source.kind() {
                ErrorKind::NotFound => 127,
                ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            _ => 1,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Injected I/O channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The relay's own three streams.
///
/// The binary wires the process streams; tests wire in-memory buffers.
pub struct RelayIo<I, O, E> {
    pub stdin: I,
    pub stdout: O,
    pub stderr: E,
}

impl RelayIo<tokio::io::Stdin, tokio::io::Stdout, tokio::io::Stderr> {
    /// The current process's stdin/stdout/stderr.
    ///
    /// Reading tokio's stdin parks a blocking thread that cannot be
    /// cancelled, so callers should `std::process::exit` once the relay
    /// returns instead of waiting for runtime shutdown.
    pub fn process() -> Self {
        Self {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
            stderr: tokio::io::stderr(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A termination request received by the relay, forwarded to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaySignal {
    Interrupt,
    Terminate,
}

impl RelaySignal {
    /// Subscribe to SIGINT/SIGTERM delivered to this process.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen() -> std::io::Result<mpsc::Receiver<RelaySignal>> {
        let (tx, rx) = mpsc::channel(4);

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut interrupt = signal(SignalKind::interrupt())?;
            let mut terminate = signal(SignalKind::terminate())?;
            tokio::spawn(async move {
                loop {
                    let sig = tokio::select! {
                        Some(()) = interrupt.recv() => RelaySignal::Interrupt,
                        Some(()) = terminate.recv() => RelaySignal::Terminate,
                        else => break,
                    };
                    tracing::info!(?sig, "relay received signal");
                    if tx.send(sig).await.is_err() {
                        break;
                    }
                }
            });
        }

        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("relay received ctrl-c");
                    if tx.send(RelaySignal::Interrupt).await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(rx)
    }
}

#[cfg(unix)]
fn forward_signal(pid: Option<u32>, sig: RelaySignal) {
    let Some(pid) = pid else {
        return;
    };
    let signo = match sig {
        RelaySignal::Interrupt => libc::SIGINT,
        RelaySignal::Terminate => libc::SIGTERM,
    };
    // SAFETY: `pid` is our own direct child and has not been reaped yet
    // (the supervising loop is still waiting on it).
    let rc = unsafe { libc::kill(pid as libc::pid_t, signo) };
    if rc != 0 {
        tracing::warn!(
            pid,
            ?sig,
            error = %std::io::Error::last_os_error(),
            "failed to forward signal to child"
        );
    } else {
        tracing::debug!(pid, ?sig, "forwarded signal to child");
    }
}

#[cfg(not(unix))]
fn forward_signal(_pid: Option<u32>, sig: RelaySignal) {
    tracing::warn!(?sig, "signal forwarding is not supported on this platform");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-class line counters from the stdout loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounts {
    pub protocol: u64,
    pub non_parseable: u64,
    pub non_protocol: u64,
}

impl LineCounts {
    pub fn diagnostics(&self) -> u64 {
        self.non_parseable + self.non_protocol
    }
}

/// How the relayed child finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayExit {
    /// Exit code to mirror (0 when the child exited without one).
    pub exit_code: i32,
    /// Last signal forwarded to the child, if any.
    pub signalled: Option<RelaySignal>,
    pub lines: LineCounts,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProtocolRelay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A spawned child whose stdio is relayed.
pub struct ProtocolRelay {
    child: Child,
    command: String,
    grace: Duration,
    read_buffer: usize,
}

impl ProtocolRelay {
    /// Spawn `command` with piped stdio.
    ///
    /// `env` is added on top of the inherited environment, followed by the
    /// configured mode-selecting variable.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        config: &RelayConfig,
    ) -> Result<Self, RelayError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.env(&config.mode_var, &config.mode_value);

        let child = cmd.spawn().map_err(|source| RelayError::Spawn {
            command: command.to_owned(),
            source,
        })?;

        tracing::info!(command, pid = ?child.id(), "relay child spawned");

        Ok(Self {
            child,
            command: command.to_owned(),
            grace: Duration::from_millis(config.shutdown_grace_ms),
            read_buffer: config.read_buffer_bytes.max(1),
        })
    }

    /// OS process id of the child, while it is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Relay until the child exits.
    ///
    /// Signals arriving on `signals` are forwarded to the child; if it is
    /// still running after the grace period it is killed.
    pub async fn run<I, O, E>(
        self,
        io: RelayIo<I, O, E>,
        mut signals: mpsc::Receiver<RelaySignal>,
    ) -> Result<RelayExit, RelayError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let Self {
            mut child,
            command,
            grace,
            read_buffer,
        } = self;

        let child_stdin = child.stdin.take().ok_or(RelayError::Pipe("stdin"))?;
        let child_stdout = child.stdout.take().ok_or(RelayError::Pipe("stdout"))?;
        let child_stderr = child.stderr.take().ok_or(RelayError::Pipe("stderr"))?;
        let pid = child.id();

        let RelayIo {
            stdin,
            mut stdout,
            stderr,
        } = io;
        // Both output loops write diagnostics; a line is written under one
        // lock acquisition so lines never interleave mid-way.
        let diagnostics = Mutex::new(stderr);

        let pump = pump_stdin(stdin, child_stdin, read_buffer);
        let outputs = async {
            tokio::join!(
                forward_stdout(child_stdout, &mut stdout, &diagnostics, read_buffer),
                forward_stderr(child_stderr, &diagnostics, read_buffer),
            )
        };
        tokio::pin!(pump);
        tokio::pin!(outputs);

        let mut pump_done = false;
        let mut counts: Option<LineCounts> = None;
        let mut signalled = None;
        let mut kill_at: Option<Instant> = None;

        let status: ExitStatus = loop {
            let step = tokio::select! {
                res = child.wait() => Step::Exited(res?),
                (out, err) = &mut outputs, if counts.is_none() => Step::Drained(out, err),
                _ = &mut pump, if !pump_done => Step::StdinClosed,
                Some(sig) = signals.recv() => Step::Signal(sig),
                _ = sleep_until_opt(kill_at), if kill_at.is_some() => Step::GraceElapsed,
            };

            match step {
                Step::Exited(status) => break status,
                Step::Drained(out, err) => counts = Some(settle(out, err)),
                Step::StdinClosed => pump_done = true,
                Step::Signal(sig) => {
                    forward_signal(pid, sig);
                    signalled = Some(sig);
                    kill_at.get_or_insert_with(|| Instant::now() + grace);
                }
                Step::GraceElapsed => {
                    tracing::warn!(
                        command = %command,
                        grace_ms = grace.as_millis() as u64,
                        "child still running after forwarded signal, killing"
                    );
                    kill_at = None;
                    child.start_kill()?;
                }
            }
        };

        // The child is gone; give its pipes the grace period to drain (a
        // grandchild may still hold them open).
        let lines = match counts {
            Some(c) => c,
            None => match tokio::time::timeout(grace, &mut outputs).await {
                Ok((out, err)) => settle(out, err),
                Err(_) => {
                    tracing::warn!("child output still open after exit, abandoning");
                    LineCounts::default()
                }
            },
        };

        let exit_code = status.code().unwrap_or(0);

        TraceEvent::RelayExited {
            exit_code,
            protocol_lines: lines.protocol,
            diagnostic_lines: lines.diagnostics(),
        }
        .emit();

        Ok(RelayExit {
            exit_code,
            signalled,
            lines,
        })
    }
}

enum Step {
    Exited(ExitStatus),
    Drained(std::io::Result<LineCounts>, std::io::Result<()>),
    StdinClosed,
    Signal(RelaySignal),
    GraceElapsed,
}

fn settle(out: std::io::Result<LineCounts>, err: std::io::Result<()>) -> LineCounts {
    if let Err(e) = err {
        tracing::warn!(error = %e, "child stderr forwarding stopped");
    }
    match out {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "child stdout forwarding stopped");
            LineCounts::default()
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Forwarding loops
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Copy relay stdin to the child verbatim. EOF closes the child's stdin.
async fn pump_stdin<I>(mut input: I, mut child_stdin: ChildStdin, buf_size: usize)
where
    I: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buf_size];
    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "reading relay stdin failed");
                break;
            }
        };
        if let Err(e) = child_stdin.write_all(&buf[..n]).await {
            tracing::debug!(error = %e, "child stdin closed, dropping input");
            return;
        }
        if let Err(e) = child_stdin.flush().await {
            tracing::debug!(error = %e, "child stdin closed, dropping input");
            return;
        }
    }
    if let Err(e) = child_stdin.shutdown().await {
        tracing::debug!(error = %e, "error closing child stdin");
    }
}

/// Split child stdout into lines and route each one exactly once.
///
/// A consumer that stops reading does not stall the child: once writing
/// to `out` fails, protocol lines are discarded but stdout keeps draining.
pub(crate) async fn forward_stdout<R, O, E>(
    mut reader: R,
    out: &mut O,
    diagnostics: &Mutex<E>,
    buf_size: usize,
) -> std::io::Result<LineCounts>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut router = Router {
        out,
        diagnostics,
        counts: LineCounts::default(),
        consumer_gone: false,
    };
    let mut buf = vec![0u8; buf_size];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for line in splitter.push(&buf[..n]) {
            router.route(&line).await;
        }
    }
    if let Some(line) = splitter.finish() {
        router.route(&line).await;
    }

    Ok(router.counts)
}

struct Router<'a, O, E> {
    out: &'a mut O,
    diagnostics: &'a Mutex<E>,
    counts: LineCounts,
    consumer_gone: bool,
}

impl<O, E> Router<'_, O, E>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    async fn route(&mut self, line: &str) {
        let class = classify_line(line);
        match class.tag() {
            None => {
                self.counts.protocol += 1;
                if self.consumer_gone {
                    return;
                }
                if let Err(e) = write_line(&mut *self.out, line.as_bytes()).await {
                    tracing::warn!(error = %e, "relay stdout closed, discarding protocol output");
                    self.consumer_gone = true;
                }
            }
            Some(tag) => {
                if class == LineClass::NonParseable {
                    self.counts.non_parseable += 1;
                } else {
                    self.counts.non_protocol += 1;
                }
                let tagged = format!("[{tag}] {line}");
                let mut diag = self.diagnostics.lock().await;
                if let Err(e) = write_line(&mut *diag, tagged.as_bytes()).await {
                    tracing::debug!(error = %e, "relay stderr closed, dropping diagnostic");
                }
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(w: &mut W, line: &[u8]) -> std::io::Result<()> {
    w.write_all(line).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}

/// Forward child stderr unchanged, flushing after every read.
///
/// Once our own stderr fails, the child's stderr is still drained (and
/// discarded) so the child never blocks on a full pipe.
pub(crate) async fn forward_stderr<R, E>(
    mut reader: R,
    diagnostics: &Mutex<E>,
    buf_size: usize,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buf_size];
    let mut sink_gone = false;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if sink_gone {
            continue;
        }
        let mut diag = diagnostics.lock().await;
        let written = match diag.write_all(&buf[..n]).await {
            Ok(()) => diag.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!(error = %e, "relay stderr closed, discarding child stderr");
            sink_gone = true;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
