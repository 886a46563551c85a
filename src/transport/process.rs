//! # ProcessTransport: workers as OS child processes.
//!
//! Each worker is a child process speaking newline-delimited JSON:
//!
//! ```text
//!               stdin  (ControlMessage per line) ◄── writer task ◄── mpsc ◄── send()
//! child process
//!               stdout (WorkerMessage per line)  ──► pump task ──► Inbox
//!                                                       └─► wait() ──► Inbound::Exited
//! ```
//!
//! ## Rules
//! - The pump forwards messages in arrival order, then reports the exit last.
//! - A process leaves the live set before its exit is reported.
//! - `kill()` on a process that already exited is a no-op (its pid may be reused).
//! - stderr is inherited so worker crashes stay visible.
//! - A stdout line that is not UTF-8, or longer than [`MAX_LINE_BYTES`], is
//!   dropped; only EOF or a read error ends the pump.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ExitInfo, Inbound, Inbox, Transport, WorkerId, WorkerProcess};
use crate::error::TransportError;
use crate::message::{ControlMessage, WorkerMessage};

/// Environment variable carrying the worker id into the child.
pub const WORKER_ID_ENV: &str = "POOLVISOR_WORKER_ID";

/// Longest stdout line, newline included, accepted from a worker.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

type LiveSet = Arc<Mutex<HashMap<WorkerId, mpsc::UnboundedSender<ControlMessage>>>>;

/// Spawns workers by executing one program repeatedly.
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    next_id: u64,
    live: LiveSet,
}

impl ProcessTransport {
    /// Creates a transport for `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            next_id: 0,
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Appends command-line arguments for every worker.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable for every worker.
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn live(&self) -> std::sync::MutexGuard<'_, HashMap<WorkerId, mpsc::UnboundedSender<ControlMessage>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for ProcessTransport {
    type Process = ChildProcess;

    fn spawn(&mut self, inbox: &Inbox) -> Result<ChildProcess, TransportError> {
        self.next_id += 1;
        let id = WorkerId::new(self.next_id);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(WORKER_ID_ENV, id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let (tx, rx) = mpsc::unbounded_channel();
        let disconnect = CancellationToken::new();
        let exited = Arc::new(AtomicBool::new(false));

        self.live().insert(id, tx.clone());

        tokio::spawn(write_control(stdin, rx, disconnect.clone()));
        tokio::spawn(pump(
            id,
            child,
            stdout,
            inbox.clone(),
            Arc::clone(&self.live),
            Arc::clone(&exited),
        ));

        Ok(ChildProcess {
            id,
            pid,
            control: tx,
            disconnect,
            exited,
        })
    }

    fn broadcast(&mut self, message: ControlMessage) -> usize {
        self.live()
            .values()
            .filter(|tx| tx.send(message).is_ok())
            .count()
    }

    fn live_count(&self) -> usize {
        self.live().len()
    }
}

/// Handle-side view of one child process.
pub struct ChildProcess {
    id: WorkerId,
    pid: Option<u32>,
    control: mpsc::UnboundedSender<ControlMessage>,
    disconnect: CancellationToken,
    exited: Arc<AtomicBool>,
}

impl WorkerProcess for ChildProcess {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn send(&mut self, message: ControlMessage) -> Result<(), TransportError> {
        if self.disconnect.is_cancelled() {
            return Err(TransportError::Closed { id: self.id });
        }
        self.control
            .send(message)
            .map_err(|_| TransportError::Closed { id: self.id })
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.disconnect.cancel();
        Ok(())
    }

    fn kill(&mut self) -> Result<(), TransportError> {
        if self.exited.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(pid) = self.pid.and_then(|p| i32::try_from(p).ok()) else {
            return Ok(());
        };
        signal::kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(|errno| {
            TransportError::Signal {
                id: self.id,
                reason: errno.desc().to_string(),
            }
        })
    }
}

/// Writes control messages to the child's stdin until disconnected or broken.
async fn write_control(
    stdin: Option<ChildStdin>,
    mut rx: mpsc::UnboundedReceiver<ControlMessage>,
    disconnect: CancellationToken,
) {
    let Some(mut stdin) = stdin else { return };

    loop {
        // Queued messages are flushed before a disconnect takes effect.
        let message = tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
            _ = disconnect.cancelled() => break,
        };

        let Ok(mut line) = serde_json::to_vec(&message) else {
            continue;
        };
        line.push(b'\n');
        if stdin.write_all(&line).await.is_err() || stdin.flush().await.is_err() {
            break;
        }
    }
}

/// One framed read from a worker's stdout.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    /// A line is in the buffer, without its line terminator.
    Line,
    /// A line exceeded the limit and was discarded.
    Oversized,
    Eof,
}

/// Reads the next newline-terminated line into `buf`, keeping at most `max`
/// bytes of it. Bytes past the limit are consumed and discarded.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut oversized = false;
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(match (oversized, buf.is_empty()) {
                (true, _) => Frame::Oversized,
                (false, true) => Frame::Eof,
                (false, false) => Frame::Line,
            });
        }

        let (used, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (chunk.len(), false),
        };
        if !oversized {
            if buf.len() + used > max {
                oversized = true;
                buf.clear();
            } else {
                buf.extend_from_slice(&chunk[..used]);
            }
        }
        reader.consume(used);

        if done {
            if oversized {
                return Ok(Frame::Oversized);
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            return Ok(Frame::Line);
        }
    }
}

/// Forwards the child's messages to the inbox, then reports its exit.
async fn pump(
    id: WorkerId,
    mut child: Child,
    stdout: Option<ChildStdout>,
    inbox: Inbox,
    live: LiveSet,
    exited: Arc<AtomicBool>,
) {
    if let Some(stdout) = stdout {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            match read_frame(&mut reader, &mut buf, MAX_LINE_BYTES).await {
                Ok(Frame::Line) => {
                    let line = match std::str::from_utf8(&buf) {
                        Ok(line) => line,
                        Err(_) => {
                            tracing::warn!(worker = %id, "dropping non-UTF-8 worker output");
                            continue;
                        }
                    };
                    match WorkerMessage::decode(line) {
                        Some(message) => inbox.deliver(Inbound::Message { id, message }),
                        None => tracing::trace!(worker = %id, "dropping untagged worker output"),
                    }
                }
                Ok(Frame::Oversized) => {
                    tracing::warn!(
                        worker = %id,
                        limit = MAX_LINE_BYTES,
                        "dropping oversized worker output"
                    );
                }
                Ok(Frame::Eof) => break,
                Err(e) => {
                    tracing::warn!(worker = %id, error = %e, "cannot read worker output");
                    break;
                }
            }
        }
    }

    let exit = match child.wait().await {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            tracing::warn!(worker = %id, error = %e, "cannot collect worker exit status");
            ExitInfo::default()
        }
    };

    exited.store(true, Ordering::Release);
    live.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    inbox.deliver(Inbound::Exited { id, exit });
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn frames(input: &[u8], max: usize) -> Vec<(Frame, Vec<u8>)> {
        let mut reader = BufReader::with_capacity(4, input);
        let mut buf = Vec::new();
        let mut out = Vec::new();
        loop {
            let frame = read_frame(&mut reader, &mut buf, max).await.unwrap();
            if frame == Frame::Eof {
                return out;
            }
            out.push((frame, buf.clone()));
        }
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_the_stream() {
        let got = frames(b"\xff\xfegarbage\n{\"type\":\"alive\"}\r\n", 64).await;
        assert_eq!(
            got,
            vec![
                (Frame::Line, b"\xff\xfegarbage".to_vec()),
                (Frame::Line, br#"{"type":"alive"}"#.to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_line_is_skipped() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nshort\n");
        input.extend_from_slice(&[b'y'; 40]);

        let got = frames(&input, 16).await;
        assert_eq!(
            got,
            vec![
                (Frame::Oversized, Vec::new()),
                (Frame::Line, b"short".to_vec()),
                (Frame::Oversized, Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn unterminated_last_line_is_kept() {
        let got = frames(b"tail", 16).await;
        assert_eq!(got, vec![(Frame::Line, b"tail".to_vec())]);
    }
}
