//! Route authorization gates.
//!
//! Gates run in a fixed order: authenticated, then activated, then each
//! required permission. A later gate implies the earlier ones, so a chain
//! built from any gate always includes its prerequisites.

use thiserror::Error;
use tracing::debug;

use super::identity::Identity;
use crate::store::{PermissionStore, StoreError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("You must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("Your user account must be activated to access this resource")]
    AccountInactive,

    #[error("Your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    #[error("Permission lookup failed: {0}")]
    Transient(#[from] StoreError),
}

/// A single authorization requirement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Gate {
    Authenticated,
    Activated,
    Permission(String),
}

/// An ordered list of gates checked before a handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateChain {
    gates: Vec<Gate>,
}

impl GateChain {
    /// Build a chain from `gates`, adding implied prerequisites and putting
    /// everything in check order.
    pub fn new(gates: impl IntoIterator<Item = Gate>) -> Self {
        let mut normalized = Vec::new();
        for gate in gates {
            match &gate {
                Gate::Authenticated => {}
                Gate::Activated => normalized.push(Gate::Authenticated),
                Gate::Permission(_) => {
                    normalized.push(Gate::Authenticated);
                    normalized.push(Gate::Activated);
                }
            }
            normalized.push(gate);
        }
        normalized.sort();
        normalized.dedup();
        Self { gates: normalized }
    }

    pub fn authenticated() -> Self {
        Self::new([Gate::Authenticated])
    }

    pub fn activated() -> Self {
        Self::new([Gate::Activated])
    }

    pub fn permission(code: impl Into<String>) -> Self {
        Self::new([Gate::Permission(code.into())])
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Check every gate in order, stopping at the first failure.
    ///
    /// Permissions are loaded at most once, and only if a permission gate is
    /// reached. A load failure is [`AccessError::Transient`], never
    /// [`AccessError::NotPermitted`].
    pub async fn check<P>(&self, identity: &Identity, permissions: &P) -> Result<(), AccessError>
    where
        P: PermissionStore + ?Sized,
    {
        let mut loaded = None;

        for gate in &self.gates {
            match gate {
                Gate::Authenticated => {
                    if identity.is_anonymous() {
                        return Err(AccessError::AuthenticationRequired);
                    }
                }
                Gate::Activated => {
                    let activated = identity.user().map(|u| u.activated).unwrap_or(false);
                    if !activated {
                        return Err(AccessError::AccountInactive);
                    }
                }
                Gate::Permission(code) => {
                    let Some(user) = identity.user() else {
                        return Err(AccessError::AuthenticationRequired);
                    };
                    if loaded.is_none() {
                        loaded = Some(permissions.load_permissions(user.id).await?);
                    }
                    let granted = loaded.as_ref().is_some_and(|p| p.includes(code));
                    if !granted {
                        debug!(user_id = user.id, permission = %code, "Permission denied");
                        return Err(AccessError::NotPermitted);
                    }
                }
            }
        }
        Ok(())
    }
}
