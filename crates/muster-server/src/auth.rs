//! Operator session authentication
//!
//! Credentials are held as SHA-256 digests and compared digest-to-digest.
//! Successful logins mint an opaque random token with a fixed expiry; a
//! missing, unknown, or expired token all surface as the same
//! `Unauthenticated` condition so callers cannot probe which factor failed.

use std::time::Duration;

use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};

use muster_core::time::current_time_millis;
use muster_core::AuthError;

/// Store of active operator sessions.
pub struct SessionStore {
    /// token -> expiry, milliseconds since the Unix epoch
    sessions: DashMap<String, u64>,
    username_digest: [u8; 32],
    password_digest: [u8; 32],
    ttl: Duration,
}

impl SessionStore {
    /// Create a store for a single admin identity.
    pub fn new(username: &str, password: &str, ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            username_digest: digest(username),
            password_digest: digest(password),
            ttl,
        }
    }

    /// Validate credentials and mint a session token.
    ///
    /// Both factors are checked unconditionally so a username mismatch costs
    /// the same as a password mismatch.
    pub fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let username_ok = digest(username) == self.username_digest;
        let password_ok = digest(password) == self.password_digest;
        if !(username_ok && password_ok) {
            return Err(AuthError::InvalidCredentials);
        }

        let token = random_token();
        let expires_at = current_time_millis() + self.ttl.as_millis() as u64;
        self.sessions.insert(token.clone(), expires_at);
        tracing::info!("Operator session created");
        Ok(token)
    }

    /// Check that a token names a live session.
    ///
    /// Expiry is fixed at login time; authorization never extends it. An
    /// expired token is removed on sight.
    pub fn authorize(&self, token: &str) -> Result<(), AuthError> {
        let expires_at = match self.sessions.get(token) {
            Some(entry) => *entry,
            None => return Err(AuthError::Unauthenticated),
        };

        if current_time_millis() >= expires_at {
            self.sessions.remove(token);
            return Err(AuthError::Unauthenticated);
        }

        Ok(())
    }

    /// Invalidate a session. Unknown tokens are a no-op.
    pub fn logout(&self, token: &str) {
        if self.sessions.remove(token).is_some() {
            tracing::info!("Operator session ended");
        }
    }

    /// Drop sessions whose expiry has passed.
    pub fn purge_expired(&self, now: u64) {
        self.sessions.retain(|_, expires_at| *expires_at > now);
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if there are no live sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn digest(input: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize().into()
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new("admin", "hunter2", Duration::from_secs(3600))
    }

    #[test]
    fn test_login_success() {
        let store = store();
        let token = store.login("admin", "hunter2").unwrap();
        assert!(store.authorize(&token).is_ok());
    }

    #[test]
    fn test_login_wrong_password() {
        let store = store();
        let err = store.login("admin", "wrong").unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[test]
    fn test_login_wrong_username() {
        let store = store();
        let err = store.login("root", "hunter2").unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[test]
    fn test_unknown_token_is_unauthenticated() {
        let store = store();
        assert_eq!(
            store.authorize("deadbeef").unwrap_err(),
            AuthError::Unauthenticated
        );
    }

    #[test]
    fn test_expired_token_is_unauthenticated() {
        let store = SessionStore::new("admin", "hunter2", Duration::ZERO);
        let token = store.login("admin", "hunter2").unwrap();
        assert_eq!(
            store.authorize(&token).unwrap_err(),
            AuthError::Unauthenticated
        );
        // Removed on sight
        assert!(store.is_empty());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let store = store();
        let token = store.login("admin", "hunter2").unwrap();
        store.logout(&token);
        store.logout(&token);
        assert!(store.authorize(&token).is_err());
    }

    #[test]
    fn test_purge_expired() {
        let store = store();
        let token = store.login("admin", "hunter2").unwrap();
        store.purge_expired(u64::MAX);
        assert!(store.is_empty());
        assert!(store.authorize(&token).is_err());
    }

    #[test]
    fn test_tokens_are_unique() {
        let store = store();
        let a = store.login("admin", "hunter2").unwrap();
        let b = store.login("admin", "hunter2").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }
}
