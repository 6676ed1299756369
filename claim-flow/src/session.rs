use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    backend::{ClaimsBackend, bounded},
    error::{ClaimError, Result},
    storage::SessionStore,
};

pub const AUTH_FALLBACK: &str = "Invalid username or password.";
pub const CREDENTIALS_REQUIRED: &str = "Username and password are required.";
pub const NOT_SIGNED_IN: &str = "not signed in";

pub mod session_keys {
    pub const PRINCIPAL: &str = "user";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Restricted role: sees the damage report only.
    Adjuster,
    /// Privileged role: additionally sees the fraud-check narrative.
    Manager,
}

impl Role {
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Manager)
    }

    pub fn can_view_fraud_check(self) -> bool {
        self.is_privileged()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Adjuster => f.write_str("adjuster"),
            Role::Manager => f.write_str("manager"),
        }
    }
}

/// The authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: u64,
    pub username: String,
    pub role: Role,
}

/// Holds the current principal and gates everything else behind authentication.
pub struct SessionGate {
    backend: Arc<dyn ClaimsBackend>,
    store: Arc<dyn SessionStore>,
    current: RwLock<Option<Principal>>,
    request_timeout: Option<Duration>,
}

impl SessionGate {
    pub fn new(backend: Arc<dyn ClaimsBackend>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            backend,
            store,
            current: RwLock::new(None),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Pick up a principal saved earlier in the same browsing session.
    /// An entry that no longer decodes is removed and the gate stays signed out.
    pub async fn restore(&self) -> Result<Option<Principal>> {
        let Some(raw) = self.store.get(session_keys::PRINCIPAL).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<Principal>(raw) {
            Ok(principal) => {
                info!(username = %principal.username, role = %principal.role, "Restored session");
                self.set_current(Some(principal.clone()));
                Ok(Some(principal))
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored principal");
                self.store.delete(session_keys::PRINCIPAL).await?;
                Ok(None)
            }
        }
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Principal> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ClaimError::Validation(CREDENTIALS_REQUIRED.to_string()));
        }

        let principal = bounded(
            self.request_timeout,
            self.backend.authenticate(username, password),
        )
        .await
        .map_err(|e| {
            warn!(username, error = %e, "Authentication failed");
            ClaimError::Auth(e.user_message(AUTH_FALLBACK))
        })?;

        let value = serde_json::to_value(&principal)
            .map_err(|e| ClaimError::Auth(format!("failed to record session: {e}")))?;
        self.store.save(session_keys::PRINCIPAL, value).await?;
        self.set_current(Some(principal.clone()));

        info!(username = %principal.username, role = %principal.role, "Signed in");
        Ok(principal)
    }

    /// Clear the principal. Safe to call when already signed out.
    pub async fn end_session(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Err(e) = self.store.delete(session_keys::PRINCIPAL).await {
            warn!(error = %e, "Failed to remove stored principal");
        }
        if let Some(principal) = previous {
            info!(username = %principal.username, "Signed out");
        }
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn require_principal(&self) -> Result<Principal> {
        self.current_principal()
            .ok_or_else(|| ClaimError::Auth(NOT_SIGNED_IN.to_string()))
    }

    fn set_current(&self, principal: Option<Principal>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = principal;
    }
}
