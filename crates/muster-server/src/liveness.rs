//! Liveness monitor
//!
//! Background loop that expires agents whose heartbeat has gone stale and
//! removes them from the registry. Removal is the only mutation this task
//! performs; it never dispatches commands.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use muster_core::time::current_time_millis;
use muster_core::AgentName;

use crate::registry::AgentRegistry;
use crate::state::ServerState;

/// Run the liveness monitor until cancelled.
///
/// Each tick sweeps the registry for stale agents and purges expired
/// operator sessions. An agent missed by at most one tick is therefore
/// removed within `timeout + interval` of its last heartbeat.
pub async fn run_liveness_monitor(state: ServerState, cancel: CancellationToken) {
    let interval = state.config.liveness_interval;
    let timeout = state.config.heartbeat_timeout;
    let mut ticker = tokio::time::interval(interval);

    tracing::info!(
        "Starting liveness monitor (heartbeat timeout: {:?}, sweep interval: {:?})",
        timeout,
        interval
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = current_time_millis();
                let expired = expire_stale(&state.registry, timeout, now);
                if !expired.is_empty() {
                    tracing::info!("Expired {} stale agents", expired.len());
                }
                state.sessions.purge_expired(now);
            }
            _ = cancel.cancelled() => {
                tracing::info!("Liveness monitor shutting down");
                break;
            }
        }
    }
}

/// Remove every agent whose last heartbeat is older than `timeout` at `now`.
///
/// Agents already removed by a concurrent disconnect are skipped without
/// error. Returns the names that were expired.
pub fn expire_stale(registry: &AgentRegistry, timeout: Duration, now: u64) -> Vec<AgentName> {
    let cutoff = now.saturating_sub(timeout.as_millis() as u64);
    let mut expired = Vec::new();

    for handle in registry.broadcast_targets() {
        if handle.last_heartbeat() < cutoff {
            let name = handle.name().clone();
            if registry.remove(&name).is_some() {
                tracing::info!(
                    "Agent {} expired ({}ms since last heartbeat)",
                    name,
                    now.saturating_sub(handle.last_heartbeat())
                );
                expired.push(name);
            }
        }
    }

    expired
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::registry::{AgentHandle, AgentRegistry};

    const TIMEOUT: Duration = Duration::from_secs(20);

    fn admit_at(registry: &AgentRegistry, name: &str, admitted: u64) -> Arc<AgentHandle> {
        let (tx, _rx) = mpsc::channel(8);
        let handle = Arc::new(AgentHandle::new_at(
            AgentName::new(name).unwrap(),
            tx,
            CancellationToken::new(),
            admitted,
        ));
        registry.admit(Arc::clone(&handle)).unwrap();
        handle
    }

    #[test]
    fn test_stale_agent_is_expired() {
        let registry = AgentRegistry::new();
        admit_at(&registry, "stale", 1_000);
        let fresh = admit_at(&registry, "fresh", 1_000);

        let now = 1_000 + TIMEOUT.as_millis() as u64 + 1;
        fresh.record_heartbeat(now - 1_000);

        let expired = expire_stale(&registry, TIMEOUT, now);
        assert_eq!(expired, vec![AgentName::new("stale").unwrap()]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_agent_within_timeout_survives() {
        let registry = AgentRegistry::new();
        admit_at(&registry, "bot1", 1_000);

        let now = 1_000 + TIMEOUT.as_millis() as u64;
        let expired = expire_stale(&registry, TIMEOUT, now);
        assert!(expired.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_expiry_cancels_connection() {
        let registry = AgentRegistry::new();
        let handle = admit_at(&registry, "bot1", 1_000);
        let cancel = handle.cancel_token().clone();

        let now = 1_000 + TIMEOUT.as_millis() as u64 + 1;
        expire_stale(&registry, TIMEOUT, now);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_concurrent_removal_is_noop() {
        let registry = AgentRegistry::new();
        admit_at(&registry, "bot1", 1_000);

        // Disconnect path wins the race
        registry.remove(&AgentName::new("bot1").unwrap());

        let now = 1_000 + TIMEOUT.as_millis() as u64 + 1;
        let expired = expire_stale(&registry, TIMEOUT, now);
        assert!(expired.is_empty());
    }

    #[test]
    fn test_lagging_agent_clock_does_not_expire() {
        let registry = AgentRegistry::new();
        // Stale stamp, as if the agent's own clock were far behind
        admit_at(&registry, "bot1", 1_000);

        // A heartbeat arrives; liveness is stamped with receipt time, so
        // the agent survives the next sweep regardless of its clock.
        registry.touch(&AgentName::new("bot1").unwrap()).unwrap();

        let expired = expire_stale(&registry, TIMEOUT, current_time_millis());
        assert!(expired.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_heartbeat_keeps_agent_alive() {
        let registry = AgentRegistry::new();
        let handle = admit_at(&registry, "bot1", 1_000);

        let now = 1_000 + 2 * TIMEOUT.as_millis() as u64;
        handle.record_heartbeat(now - 1);

        let expired = expire_stale(&registry, TIMEOUT, now);
        assert!(expired.is_empty());
    }
}
