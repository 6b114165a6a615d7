//! Shared server state

use std::sync::Arc;

use muster_core::config::ServerConfig;

use crate::auth::SessionStore;
use crate::registry::AgentRegistry;

/// State shared by the API handlers, the liveness monitor, and the agent
/// socket tasks. Cheap to clone; all fields are behind `Arc`.
#[derive(Clone)]
pub struct ServerState {
    /// Configuration
    pub config: Arc<ServerConfig>,
    /// Agent registry
    pub registry: Arc<AgentRegistry>,
    /// Operator sessions
    pub sessions: Arc<SessionStore>,
}

impl ServerState {
    /// Create new server state from configuration.
    pub fn new(config: ServerConfig) -> Self {
        let sessions = SessionStore::new(
            &config.admin_username,
            &config.admin_password,
            config.session_ttl,
        );
        Self {
            config: Arc::new(config),
            registry: Arc::new(AgentRegistry::new()),
            sessions: Arc::new(sessions),
        }
    }
}
