//! Child process lifecycle.
//!
//! Spawns the MCP server, and hands the `Child` to a supervisor task that
//! reads stdout line by line, publishes every JSON object it sees, and
//! reports the exit. One supervisor exists per spawned process; events carry
//! the process generation so stale ones can be told apart.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use super::errors::BridgeError;
use super::transport::StdinTransport;
use crate::config::ProcessConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// How long to keep reading stdout after the process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

// ─── Events ──────────────────────────────────────────────────────────────────

/// Something the supervisor observed on a child process.
#[derive(Debug)]
pub struct ProcessEvent {
    pub generation: u64,
    pub kind: ProcessEventKind,
}

#[derive(Debug)]
pub enum ProcessEventKind {
    /// One stdout line that decoded to a JSON object.
    Message(Value),
    /// The process is gone.
    Exited { reason: String },
}

pub type EventSender = mpsc::UnboundedSender<ProcessEvent>;

// ─── ProcessHandle ───────────────────────────────────────────────────────────

/// The tracked child process: its stdin and a way to stop it.
///
/// Dropping the handle also stops the process.
pub struct ProcessHandle {
    pub generation: u64,
    pub pid: Option<u32>,
    transport: Arc<StdinTransport>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    pub fn transport(&self) -> Arc<StdinTransport> {
        Arc::clone(&self.transport)
    }

    /// Close stdin and ask the supervisor to stop the process.
    ///
    /// The supervisor waits for a voluntary exit before killing it, and
    /// reports `Exited` either way.
    pub async fn terminate(mut self) {
        self.transport.close().await;
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn the MCP server and start its supervisor and stderr logger.
pub fn spawn_process(
    config: &ProcessConfig,
    generation: u64,
    shutdown_timeout: Duration,
    events: EventSender,
) -> Result<ProcessHandle, BridgeError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    for (key, value) in &config.env {
        cmd.env(key, value);
    }
    if let Some(token) = &config.access_token {
        cmd.env(&config.child_credential_var, token.expose());
    }
    if let Some(dir) = &config.cwd {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let spawn_failed = |reason: String| BridgeError::SpawnFailed {
        command: config.display_command(),
        reason,
    };

    let mut child = cmd.spawn().map_err(|e| spawn_failed(e.to_string()))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| spawn_failed("failed to capture stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| spawn_failed("failed to capture stdout".into()))?;
    let stderr = child.stderr.take();

    let pid = child.id();
    let (stop_tx, stop_rx) = oneshot::channel();

    tracing::info!(
        generation,
        pid = pid.unwrap_or_default(),
        command = %config.display_command(),
        credential = config.has_credential(),
        "spawned MCP server process"
    );

    if let Some(stderr) = stderr {
        tokio::spawn(log_stderr(generation, stderr));
    }
    tokio::spawn(supervise(
        child,
        stdout,
        generation,
        events,
        stop_rx,
        shutdown_timeout,
    ));

    Ok(ProcessHandle {
        generation,
        pid,
        transport: Arc::new(StdinTransport::new(stdin)),
        stop_tx: Some(stop_tx),
    })
}

/// Own the child until it exits; publish its stdout and its exit.
async fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    generation: u64,
    events: EventSender,
    mut stop_rx: oneshot::Receiver<()>,
    shutdown_timeout: Duration,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut stdout_open = true;

    let status = loop {
        tokio::select! {
            line = lines.next_line(), if stdout_open => match line {
                Ok(Some(line)) => publish_line(generation, &line, &events),
                Ok(None) => stdout_open = false,
                Err(e) => {
                    tracing::warn!(generation, error = %e, "failed to read MCP server stdout");
                    stdout_open = false;
                }
            },
            status = child.wait() => break status,
            // Fires on an explicit stop and when the handle is dropped.
            _ = &mut stop_rx => break stop_child(&mut child, shutdown_timeout).await,
        }
    };

    if stdout_open {
        while let Ok(Ok(Some(line))) = tokio::time::timeout(DRAIN_TIMEOUT, lines.next_line()).await
        {
            publish_line(generation, &line, &events);
        }
    }

    let reason = match status {
        Ok(status) => status.to_string(),
        Err(e) => format!("failed to wait for process: {e}"),
    };
    tracing::warn!(generation, reason = %reason, "MCP server process exited");

    let _ = events.send(ProcessEvent {
        generation,
        kind: ProcessEventKind::Exited { reason },
    });
}

/// Give the child `grace` to exit on its own, then kill it.
async fn stop_child(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "MCP server did not exit in time, killing it"
            );
            child.kill().await?;
            child.wait().await
        }
    }
}

/// Decode one stdout line. Anything that is not a JSON object is only logged.
fn publish_line(generation: u64, line: &str, events: &EventSender) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => {
            let _ = events.send(ProcessEvent {
                generation,
                kind: ProcessEventKind::Message(value),
            });
        }
        _ => {
            tracing::debug!(generation, line = %trimmed, "ignoring non-JSON-RPC output");
        }
    }
}

async fn log_stderr(generation: u64, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    tracing::info!(generation, "[mcp-server] {}", line.trim_end());
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(generation, error = %e, "stopped reading MCP server stderr");
                break;
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
