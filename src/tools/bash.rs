//! bash tool - a persistent shell session
//!
//! One shell process lives for the lifetime of the tool. Commands are written
//! to its stdin; completion is detected by a sentinel echoed on both stdout
//! and stderr after each command, with the exit status appended on stdout.

use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;

use super::context::{ToolContext, ToolError};
use super::{Tool, ToolInputSchema, ToolResult, truncate_output};

const SENTINEL: &str = "<<toolharness-exit>>";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BashVersion {
    V20241022,
    V20250124,
}

impl BashVersion {
    fn api_type(self) -> &'static str {
        match self {
            Self::V20241022 => "bash_20241022",
            Self::V20250124 => "bash_20250124",
        }
    }
}

/// Captured output of one command
#[derive(Debug)]
struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

struct BashSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Arc<StdMutex<String>>,
    stderr: Arc<StdMutex<String>>,
    /// Set while a command runs; still set if the caller abandoned it
    busy: bool,
    timed_out: bool,
}

impl BashSession {
    fn start(shell: &str, cwd: &std::path::Path) -> Result<Self, ToolError> {
        let mut child = Command::new(shell)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::io(format!("spawn {}", shell), e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::SessionClosed("shell stdin unavailable".to_string()))?;
        let stdout = Arc::new(StdMutex::new(String::new()));
        let stderr = Arc::new(StdMutex::new(String::new()));

        if let Some(out) = child.stdout.take() {
            spawn_reader(out, Arc::clone(&stdout));
        }
        if let Some(err) = child.stderr.take() {
            spawn_reader(err, Arc::clone(&stderr));
        }

        log::debug!("Started {} session in {}", shell, cwd.display());
        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            busy: false,
            timed_out: false,
        })
    }

    async fn run(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput, ToolError> {
        if self.timed_out || self.busy {
            return Err(ToolError::SessionClosed(
                "bash session is in an unknown state after a timed out or abandoned command and must be restarted"
                    .to_string(),
            ));
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            return Err(ToolError::SessionClosed(format!(
                "bash has exited with {} and must be restarted",
                status
            )));
        }

        let script = format!(
            "{}\n__toolharness_status=$?\necho '{}'$__toolharness_status\necho '{}' >&2\n",
            command, SENTINEL, SENTINEL
        );
        self.busy = true;
        self.stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|e| ToolError::io("write to bash", e))?;
        self.stdin.flush().await.map_err(|e| ToolError::io("flush bash stdin", e))?;

        let finished = tokio::time::timeout(timeout, async {
            loop {
                if let Some(output) = self.take_completed() {
                    return output;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;

        match finished {
            Ok(output) => {
                self.busy = false;
                Ok(output)
            }
            Err(_) => {
                self.timed_out = true;
                Err(ToolError::CommandTimeout(format!(
                    "timed out: bash has not returned in {} seconds and must be restarted",
                    timeout.as_secs_f64()
                )))
            }
        }
    }

    /// Split off one finished command's output, if both sentinels arrived
    fn take_completed(&self) -> Option<CommandOutput> {
        let mut stdout = self.stdout.lock().ok()?;
        let mut stderr = self.stderr.lock().ok()?;

        let out_at = stdout.find(SENTINEL)?;
        let code_start = out_at + SENTINEL.len();
        let code_end = code_start + stdout[code_start..].find('\n')?;
        let err_at = stderr.find(SENTINEL)?;
        let err_end = err_at + stderr[err_at..].find('\n').unwrap_or(stderr.len() - err_at);

        let exit_code = stdout[code_start..code_end].trim().parse().unwrap_or(-1);
        let output = CommandOutput {
            stdout: stdout[..out_at].trim_end_matches('\n').to_string(),
            stderr: stderr[..err_at].trim_end_matches('\n').to_string(),
            exit_code,
        };

        let rest = stdout[(code_end + 1).min(stdout.len())..].to_string();
        *stdout = rest;
        let rest = stderr[(err_end + 1).min(stderr.len())..].to_string();
        *stderr = rest;

        Some(output)
    }

    async fn stop(&mut self) -> std::io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await
    }
}

fn spawn_reader<R>(mut reader: R, buffer: Arc<StdMutex<String>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
                    }
                }
            }
        }
    });
}

/// Shell-execution tool backed by a persistent session
pub struct BashTool {
    version: BashVersion,
    shell: String,
    working_dir: std::path::PathBuf,
    timeout: Duration,
    max_output_chars: usize,
    session: Mutex<Option<BashSession>>,
}

impl BashTool {
    fn new(version: BashVersion, ctx: &ToolContext) -> Self {
        let config = ctx.config();
        Self {
            version,
            shell: config.bash.shell.clone(),
            working_dir: ctx.working_dir.clone(),
            timeout: Duration::from_millis(config.bash.timeout_ms),
            max_output_chars: config.max_output_chars,
            session: Mutex::new(None),
        }
    }

    pub fn v20241022(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(BashVersion::V20241022, ctx))
    }

    pub fn v20250124(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(BashVersion::V20250124, ctx))
    }

    /// Override the per-command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn restart(&self) -> Result<ToolResult, ToolError> {
        let mut session = self.session.lock().await;
        if let Some(mut old) = session.take()
            && let Err(e) = old.stop().await
        {
            log::warn!("Failed to stop previous bash session: {}", e);
        }
        *session = Some(BashSession::start(&self.shell, &self.working_dir)?);
        Ok(ToolResult::empty().with_system("tool has been restarted."))
    }

    async fn run(&self, command: &str) -> Result<ToolResult, ToolError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(BashSession::start(&self.shell, &self.working_dir)?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(ToolError::SessionClosed("bash session unavailable".to_string()));
        };

        let output = session.run(command, self.timeout).await?;

        let combined = if output.stdout.is_empty() && !output.stderr.is_empty() {
            output.stderr.clone()
        } else if output.stderr.is_empty() {
            output.stdout.clone()
        } else {
            format!("{}\n\nSTDERR:\n{}", output.stdout, output.stderr)
        };
        let combined = truncate_output(combined, self.max_output_chars);

        if output.exit_code == 0 {
            Ok(ToolResult::success(combined))
        } else {
            Ok(ToolResult::failed(format!("Exit code: {}\n{}", output.exit_code, combined)))
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn schema(&self) -> ToolInputSchema {
        ToolInputSchema::new(
            "bash",
            "Run commands in a persistent bash shell. State (cwd, env vars) is kept between calls.",
        )
        .with_api_type(self.version.api_type())
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to run"
                },
                "restart": {
                    "type": "boolean",
                    "description": "Restart the shell session"
                }
            },
            "required": []
        }))
    }

    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error> {
        if let Err(message) = self.schema().validate(&input) {
            return Ok(ToolResult::invalid_input(message));
        }

        let outcome = if input["restart"].as_bool().unwrap_or(false) {
            self.restart().await
        } else {
            match input["command"].as_str() {
                Some(command) => self.run(command).await,
                None => Err(ToolError::InvalidInput("no command provided.".to_string())),
            }
        };

        Ok(outcome.unwrap_or_else(ToolResult::from))
    }

    async fn teardown(&self) -> Result<(), eyre::Error> {
        if let Some(mut session) = self.session.lock().await.take() {
            session.stop().await?;
        }
        Ok(())
    }
}
