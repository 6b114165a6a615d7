//! muster-core: Shared types and configuration for muster
//!
//! This crate provides the domain types, error taxonomy, and configuration
//! structures used by the server and agent components.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use error::{AuthError, DispatchError, RegistryError};
pub use types::{AgentName, CommandTarget, DispatchStatus};
