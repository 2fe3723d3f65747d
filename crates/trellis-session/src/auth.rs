//! Authentication collaborator seam.
//!
//! The session core only needs a "current user or none" signal that is
//! readable synchronously when a send begins. Absence of a user means the
//! session is ephemeral (nothing persisted), not an error.

use parking_lot::RwLock;

use trellis_core::UserId;

/// Read side of the current-user signal
pub trait AuthSource: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Shared mutable auth state for hosts that update it as the user signs in
/// and out.
#[derive(Debug, Default)]
pub struct SharedAuth {
    user: RwLock<Option<UserId>>,
}

impl SharedAuth {
    /// Create with no signed-in user
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a signed-in user
    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self {
            user: RwLock::new(Some(user.into())),
        }
    }

    pub fn sign_in(&self, user: impl Into<UserId>) {
        *self.user.write() = Some(user.into());
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl AuthSource for SharedAuth {
    fn current_user(&self) -> Option<UserId> {
        self.user.read().clone()
    }
}
