//! Execution engine running as a child process.
//!
//! The child speaks newline-delimited JSON on its stdin/stdout. Each request
//! is `{"op": "...", "params": [...]}`; each reply is
//! `{"ok": bool, "message": "...", "handle": "...", "code": n}`.

use applet_session::{EngineError, EngineReply, ExecutionEngine};
use async_trait::async_trait;
use launcher_ipc::OpCode;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long the child gets to exit on its own after UNLOAD.
const EXIT_GRACE: Duration = Duration::from_secs(3);

#[derive(Serialize)]
struct EngineRequest<'a> {
    op: &'a str,
    params: &'a [String],
}

#[derive(Deserialize)]
struct EngineResponse {
    ok: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    code: Option<i32>,
}

struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Spawns the engine on first use and keeps it for the life of the host.
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
    process: Mutex<Option<EngineProcess>>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            process: Mutex::new(None),
        }
    }

    fn spawn(&self) -> Result<EngineProcess, EngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // stdout of the host belongs to the browser
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Unavailable(format!("failed to start {}: {e}", self.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdout not captured".to_string()))?;

        info!(pid = ?child.id(), program = %self.program, "Spawned execution engine");
        Ok(EngineProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Stop the child if it is still running.
    pub async fn terminate(&self) {
        if let Some(process) = self.process.lock().await.take() {
            stop_child(process).await;
        }
    }
}

#[async_trait]
impl ExecutionEngine for ProcessEngine {
    async fn invoke(&self, opcode: OpCode, params: Vec<String>) -> Result<EngineReply, EngineError> {
        let mut guard = self.process.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(process) = guard.as_mut() else {
            return Err(EngineError::Unavailable("engine not running".to_string()));
        };

        let reply = match exchange(process, opcode, &params).await {
            Ok(reply) => reply,
            Err(e) => {
                // A broken pipe leaves the child useless; respawn next time
                if let Some(process) = guard.take() {
                    stop_child(process).await;
                }
                return Err(e);
            }
        };

        if opcode == OpCode::Unload {
            if let Some(process) = guard.take() {
                stop_child(process).await;
            }
        }

        if reply.ok {
            Ok(EngineReply {
                message: reply.message,
                handle: reply.handle,
            })
        } else {
            Err(EngineError::Rejected {
                op: opcode,
                code: reply.code.unwrap_or(-1),
                message: reply.message,
            })
        }
    }
}

async fn exchange(
    process: &mut EngineProcess,
    opcode: OpCode,
    params: &[String],
) -> Result<EngineResponse, EngineError> {
    let mut line = serde_json::to_vec(&EngineRequest {
        op: opcode.as_str(),
        params,
    })
    .map_err(|e| EngineError::Unavailable(e.to_string()))?;
    line.push(b'\n');

    debug!(op = %opcode, "Sending engine request");
    process
        .stdin
        .write_all(&line)
        .await
        .map_err(|e| EngineError::Unavailable(format!("engine write failed: {e}")))?;
    process
        .stdin
        .flush()
        .await
        .map_err(|e| EngineError::Unavailable(format!("engine write failed: {e}")))?;

    let mut reply = String::new();
    let n = process
        .stdout
        .read_line(&mut reply)
        .await
        .map_err(|e| EngineError::Unavailable(format!("engine read failed: {e}")))?;
    if n == 0 {
        return Err(EngineError::Unavailable("engine exited".to_string()));
    }

    serde_json::from_str(reply.trim())
        .map_err(|e| EngineError::Unavailable(format!("unreadable engine reply: {e}")))
}

/// Close stdin, give the child a grace period, then kill it.
async fn stop_child(process: EngineProcess) {
    let EngineProcess {
        mut child, stdin, ..
    } = process;
    drop(stdin);

    match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "Execution engine exited"),
        Ok(Err(e)) => warn!(error = %e, "Failed waiting for execution engine"),
        Err(_) => {
            warn!("Execution engine did not exit, killing it");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill execution engine");
            }
        }
    }
}
