//! Command dispatcher
//!
//! Resolves an operator request against the registry, delivers the command
//! to the selected agents concurrently, and folds the per-agent outcomes
//! into one aggregate result.

use std::sync::Arc;
use std::time::Duration;

use muster_core::{AgentName, CommandTarget, DispatchError, DispatchStatus, RegistryError};

use crate::registry::{AgentHandle, AgentRegistry};

/// Result reported by a single agent for one command.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// Whether the agent executed the command successfully
    pub success: bool,
    /// Captured output
    pub output: String,
}

/// Operator intent: a command and its target.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Non-empty command text
    pub body: String,
    /// Which agents to deliver to
    pub target: CommandTarget,
}

/// Per-agent outcome of a dispatch, kept internally for aggregation.
#[derive(Debug)]
pub struct AgentOutcome {
    /// Agent the command was delivered to
    pub name: AgentName,
    /// Delivery result, or why it failed
    pub result: Result<AgentResult, DispatchError>,
}

impl AgentOutcome {
    fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(r) if r.success)
    }
}

/// Aggregate outcome of one dispatch.
#[derive(Debug)]
pub struct DispatchReport {
    /// Overall status
    pub status: DispatchStatus,
    /// Human-readable summary for the operator
    pub message: String,
    /// Per-agent sub-results (empty for the no-agents case)
    pub outcomes: Vec<AgentOutcome>,
}

/// Dispatch a command request against the registry.
///
/// `Named` targets that are not connected fail with `UnknownAgent` before
/// any send is attempted. For `All`, the target set is a snapshot taken at
/// call time; agents admitted afterwards are not included.
pub async fn dispatch(
    registry: &AgentRegistry,
    request: CommandRequest,
    deadline: Duration,
) -> Result<DispatchReport, RegistryError> {
    match request.target {
        CommandTarget::Named(name) => {
            let handle = registry.lookup(&name)?;
            let outcome = deliver(handle, request.body, deadline).await;
            Ok(report_for_named(outcome))
        }
        CommandTarget::All => {
            let targets = registry.broadcast_targets();
            if targets.is_empty() {
                // A command that reached nobody is a failure, not a vacuous
                // success: the operator's intent was not delivered.
                return Ok(DispatchReport {
                    status: DispatchStatus::Failure,
                    message: "no agents connected".to_string(),
                    outcomes: Vec::new(),
                });
            }

            let sends = targets
                .into_iter()
                .map(|handle| deliver(handle, request.body.clone(), deadline));
            let outcomes = futures::future::join_all(sends).await;
            Ok(report_for_broadcast(outcomes))
        }
    }
}

/// Deliver one command to one agent. A timeout or closed connection becomes
/// that agent's failure; it never cancels the other in-flight sends.
async fn deliver(handle: Arc<AgentHandle>, body: String, deadline: Duration) -> AgentOutcome {
    let name = handle.name().clone();
    let result = handle.submit(body, deadline).await;

    if let Err(err) = &result {
        tracing::warn!("Dispatch to {} failed: {}", name, err);
    }

    AgentOutcome { name, result }
}

fn report_for_named(outcome: AgentOutcome) -> DispatchReport {
    let (status, message) = match &outcome.result {
        Ok(result) if result.success => (DispatchStatus::Success, result.output.trim().to_string()),
        Ok(result) => (
            DispatchStatus::Failure,
            format!("{} failed: {}", outcome.name, result.output.trim()),
        ),
        Err(err) => (DispatchStatus::Failure, err.to_string()),
    };

    DispatchReport {
        status,
        message,
        outcomes: vec![outcome],
    }
}

fn report_for_broadcast(outcomes: Vec<AgentOutcome>) -> DispatchReport {
    let total = outcomes.len();
    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.succeeded())
        .map(|o| o.name.to_string())
        .collect();

    let (status, message) = if failed.is_empty() {
        (
            DispatchStatus::Success,
            format!("command sent to {} agents", total),
        )
    } else if failed.len() == total {
        (DispatchStatus::Failure, format!("{} failed", failed.join(", ")))
    } else {
        (
            DispatchStatus::PartialFailure,
            format!("{} failed", failed.join(", ")),
        )
    };

    DispatchReport {
        status,
        message,
        outcomes,
    }
}
