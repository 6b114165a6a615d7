//! Core error types for muster

use std::path::PathBuf;
use thiserror::Error;

use crate::types::AgentName;

/// Registry-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An agent with this name is already connected
    #[error("Agent name already taken: {0}")]
    NameConflict(AgentName),

    /// No agent with this name is connected
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentName),
}

/// Authentication-related errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Login credentials did not match
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, unknown, or expired session
    #[error("Unauthenticated")]
    Unauthenticated,
}

/// Errors surfaced by a single-agent delivery attempt.
///
/// A named target missing from the registry is a `RegistryError`, raised
/// before any delivery is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The agent did not answer within the dispatch deadline
    #[error("Agent {0} timed out")]
    AgentTimeout(AgentName),

    /// The agent's connection closed while the command was in flight
    #[error("Connection to agent {0} closed")]
    ConnectionClosed(AgentName),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
