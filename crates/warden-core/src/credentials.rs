//! Shared credential store for the remote scan service.
//!
//! Holds the bearer token and account name the scan client attaches to its
//! requests. The store is the single source of truth for signed-in state:
//! the coordinator purges it when the service rejects the credential, which
//! flips the agent into its signed-out behavior (downloads pass through
//! unscanned until the user signs in again).

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// A stored scan-service credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token presented to the scan service.
    pub token: String,
    /// Account name, for display only.
    pub user: String,
}

/// Thread-safe, clonable credential store.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl CredentialStore {
    /// Creates an empty (signed-out) store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with a credential.
    pub fn with_credential(token: impl Into<String>, user: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token, user);
        store
    }

    /// Returns the current bearer token, if signed in.
    pub fn token(&self) -> Option<String> {
        self.inner.read().unwrap().as_ref().map(|c| c.token.clone())
    }

    /// Returns the current account name, if signed in.
    pub fn user(&self) -> Option<String> {
        self.inner.read().unwrap().as_ref().map(|c| c.user.clone())
    }

    /// Returns a copy of the full credential, if signed in.
    pub fn get(&self) -> Option<Credential> {
        self.inner.read().unwrap().clone()
    }

    /// Returns true if a credential is stored.
    pub fn is_signed_in(&self) -> bool {
        self.inner.read().unwrap().is_some()
    }

    /// Stores a credential.
    ///
    /// Returns true if the signed-in state changed (was signed out).
    pub fn set(&self, token: impl Into<String>, user: impl Into<String>) -> bool {
        let mut inner = self.inner.write().unwrap();
        let was_signed_out = inner.is_none();
        *inner = Some(Credential {
            token: token.into(),
            user: user.into(),
        });
        was_signed_out
    }

    /// Removes the stored credential.
    ///
    /// Returns true if the signed-in state changed (was signed in).
    pub fn clear_all(&self) -> bool {
        self.inner.write().unwrap().take().is_some()
    }
}
