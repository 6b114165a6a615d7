//! Command execution
//!
//! Commands run under `sh -c` so operators get shell semantics (pipes,
//! redirection). Execution is bounded by a timeout; a timed-out command
//! reports failure without killing the agent.

use std::time::Duration;

use tokio::process::Command;

/// Outcome of one command execution.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// Whether the command exited with status 0
    pub success: bool,
    /// stdout on success, stderr or a diagnostic otherwise
    pub output: String,
}

/// Execute a command body with a timeout.
pub async fn execute(body: &str, timeout: Duration) -> ExecOutcome {
    let run = Command::new("sh").arg("-c").arg(body).output();

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(output)) => {
            if output.status.success() {
                ExecOutcome {
                    success: true,
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                }
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let output = if stderr.trim().is_empty() {
                    format!("command exited with {}", output.status)
                } else {
                    stderr
                };
                ExecOutcome {
                    success: false,
                    output,
                }
            }
        }
        Ok(Err(e)) => ExecOutcome {
            success: false,
            output: format!("failed to spawn command: {}", e),
        },
        Err(_) => ExecOutcome {
            success: false,
            output: format!("command timed out after {} seconds", timeout.as_secs()),
        },
    }
}
