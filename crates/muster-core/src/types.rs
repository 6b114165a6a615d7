//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique name identifying a connected agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentName(String);

impl AgentName {
    /// Create a new agent name.
    ///
    /// Names are trimmed; an empty or whitespace-only name is not a valid
    /// identifier and yields `None`.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Get the raw name string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target of a command dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    /// Every currently connected agent
    All,
    /// One specific agent by name
    Named(AgentName),
}

impl CommandTarget {
    /// Parse the wire representation of a target.
    ///
    /// The literal `"all"` selects every agent; any other non-empty string is
    /// a named target. An empty string is invalid input, not a valid target.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "all" {
            return Some(Self::All);
        }
        AgentName::new(raw).map(Self::Named)
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::All => write!(f, "all"),
            CommandTarget::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Aggregate outcome of a command dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Every targeted agent succeeded
    Success,
    /// Some targeted agents succeeded, some failed or timed out
    PartialFailure,
    /// No targeted agent succeeded
    Failure,
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStatus::Success => write!(f, "success"),
            DispatchStatus::PartialFailure => write!(f, "partial_failure"),
            DispatchStatus::Failure => write!(f, "failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_name_trims() {
        let name = AgentName::new("  bot1  ").unwrap();
        assert_eq!(name.as_str(), "bot1");
    }

    #[test]
    fn test_agent_name_rejects_empty() {
        assert!(AgentName::new("").is_none());
        assert!(AgentName::new("   ").is_none());
    }

    #[test]
    fn test_target_parse_all() {
        assert_eq!(CommandTarget::parse("all"), Some(CommandTarget::All));
    }

    #[test]
    fn test_target_parse_named() {
        let target = CommandTarget::parse("bot1").unwrap();
        assert_eq!(
            target,
            CommandTarget::Named(AgentName::new("bot1").unwrap())
        );
    }

    #[test]
    fn test_target_parse_empty_is_invalid() {
        assert!(CommandTarget::parse("").is_none());
    }

    #[test]
    fn test_dispatch_status_wire_format() {
        let json = serde_json::to_string(&DispatchStatus::PartialFailure).unwrap();
        assert_eq!(json, "\"partial_failure\"");
    }
}
