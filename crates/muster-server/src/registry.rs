//! Agent registry
//!
//! The registry is the single source of truth for which agents are currently
//! connected. Every mutation goes through its operations; no other component
//! touches an agent's fields directly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use muster_core::time::current_time_millis;
use muster_core::{AgentName, DispatchError, RegistryError};
use muster_protocol::{CommandId, Message};

use crate::dispatch::AgentResult;

/// Liveness metadata for one agent, as exposed to the dashboard.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentEntry {
    /// Admission time in milliseconds since the Unix epoch
    pub connected_at: u64,
    /// Most recent heartbeat in milliseconds since the Unix epoch
    pub last_heartbeat: u64,
}

/// Handle to one connected agent.
///
/// The handle owns the outbound half of the connection (an mpsc sender
/// drained by the socket task) and the map of dispatches awaiting a result.
/// Heartbeats are monotonic: an out-of-order older timestamp never regresses
/// `last_heartbeat`.
pub struct AgentHandle {
    name: AgentName,
    connected_at: u64,
    last_heartbeat: AtomicU64,
    outbound: mpsc::Sender<Message>,
    pending: DashMap<CommandId, oneshot::Sender<AgentResult>>,
    cancel: CancellationToken,
}

impl AgentHandle {
    /// Create a handle for a freshly accepted connection.
    pub fn new(name: AgentName, outbound: mpsc::Sender<Message>, cancel: CancellationToken) -> Self {
        Self::new_at(name, outbound, cancel, current_time_millis())
    }

    /// Create a handle with an explicit admission timestamp.
    pub fn new_at(
        name: AgentName,
        outbound: mpsc::Sender<Message>,
        cancel: CancellationToken,
        now: u64,
    ) -> Self {
        Self {
            name,
            connected_at: now,
            last_heartbeat: AtomicU64::new(now),
            outbound,
            pending: DashMap::new(),
            cancel,
        }
    }

    /// The agent's unique name
    pub fn name(&self) -> &AgentName {
        &self.name
    }

    /// Admission timestamp in milliseconds
    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    /// Most recent heartbeat timestamp in milliseconds
    pub fn last_heartbeat(&self) -> u64 {
        self.last_heartbeat.load(Ordering::Relaxed)
    }

    /// Record a heartbeat. Older timestamps are a no-op.
    pub fn record_heartbeat(&self, timestamp: u64) {
        self.last_heartbeat.fetch_max(timestamp, Ordering::Relaxed);
    }

    /// Cancellation token tied to this connection
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send a command to the agent and await its result.
    ///
    /// Each call gets a fresh correlation id, so concurrent submissions on
    /// the same connection resolve independently. A timeout abandons the
    /// wait without touching the connection itself.
    pub async fn submit(&self, body: String, deadline: Duration) -> Result<AgentResult, DispatchError> {
        let id = CommandId::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = Message::Command { id, body };
        if self.outbound.send(frame).await.is_err() {
            self.pending.remove(&id);
            return Err(DispatchError::ConnectionClosed(self.name.clone()));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(DispatchError::ConnectionClosed(self.name.clone())),
            Err(_) => {
                self.pending.remove(&id);
                Err(DispatchError::AgentTimeout(self.name.clone()))
            }
        }
    }

    /// Route an incoming command result to the dispatch waiting on it.
    ///
    /// Returns false when no dispatch is waiting (late result after a
    /// timeout); such results are dropped.
    pub fn complete(&self, id: CommandId, result: AgentResult) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

/// Concurrent map of agent name to connection handle.
pub struct AgentRegistry {
    agents: DashMap<AgentName, Arc<AgentHandle>>,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    /// Admit an agent under its name.
    ///
    /// Duplicate names are rejected; the existing connection stays untouched.
    pub fn admit(&self, handle: Arc<AgentHandle>) -> Result<(), RegistryError> {
        match self.agents.entry(handle.name().clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RegistryError::NameConflict(handle.name().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                tracing::info!("Agent admitted: {}", handle.name());
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Record a heartbeat for a named agent.
    ///
    /// Liveness is judged by server receipt time, not the agent's own clock,
    /// so a skewed agent is neither expired while heartbeating nor kept
    /// alive forever.
    pub fn touch(&self, name: &AgentName) -> Result<(), RegistryError> {
        match self.agents.get(name) {
            Some(handle) => {
                handle.record_heartbeat(current_time_millis());
                Ok(())
            }
            None => Err(RegistryError::UnknownAgent(name.clone())),
        }
    }

    /// Remove an agent and cancel its connection.
    ///
    /// Removal of an absent name is a no-op, so the liveness monitor and a
    /// disconnecting socket task may race here without either faulting.
    pub fn remove(&self, name: &AgentName) -> Option<Arc<AgentHandle>> {
        let removed = self.agents.remove(name).map(|(_, handle)| handle);
        if let Some(handle) = &removed {
            handle.cancel_token().cancel();
            tracing::info!("Agent removed: {}", name);
        }
        removed
    }

    /// Remove an agent only if `handle` is still the registered connection.
    ///
    /// A socket task tearing down after the liveness monitor expired its
    /// agent may find a replacement already admitted under the same name;
    /// the stale task must not evict the successor. Returns whether the
    /// handle was removed.
    pub fn remove_if_current(&self, handle: &Arc<AgentHandle>) -> bool {
        let removed = self
            .agents
            .remove_if(handle.name(), |_, current| Arc::ptr_eq(current, handle))
            .is_some();
        if removed {
            handle.cancel_token().cancel();
            tracing::info!("Agent removed: {}", handle.name());
        }
        removed
    }

    /// Look up an agent by name
    pub fn lookup(&self, name: &AgentName) -> Result<Arc<AgentHandle>, RegistryError> {
        self.agents
            .get(name)
            .map(|r| Arc::clone(&r))
            .ok_or_else(|| RegistryError::UnknownAgent(name.clone()))
    }

    /// Immutable snapshot of liveness metadata, keyed by name.
    ///
    /// The snapshot is consistent per entry; concurrent admits and removals
    /// during iteration never produce a half-populated row.
    pub fn list(&self) -> BTreeMap<String, AgentEntry> {
        self.agents
            .iter()
            .map(|r| {
                (
                    r.key().to_string(),
                    AgentEntry {
                        connected_at: r.value().connected_at(),
                        last_heartbeat: r.value().last_heartbeat(),
                    },
                )
            })
            .collect()
    }

    /// Snapshot of all connected agents, ordered by name.
    pub fn broadcast_targets(&self) -> Vec<Arc<AgentHandle>> {
        let mut targets: Vec<_> = self.agents.iter().map(|r| Arc::clone(&r)).collect();
        targets.sort_by(|a, b| a.name().cmp(b.name()));
        targets
    }

    /// Number of connected agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Cancel every connection. Used during server shutdown after in-flight
    /// dispatches have drained.
    pub fn shutdown(&self) {
        for entry in self.agents.iter() {
            entry.value().cancel_token().cancel();
        }
        self.agents.clear();
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
