//! Session state for the signed-in user.
//!
//! Replaces ambient globals with an explicit context object owned by the
//! repository. The identity provider (external) pushes `Some(user)` /
//! `None` transitions; everything that needs the current uid asks this
//! context and fails fast when nobody is signed in.

use parking_lot::Mutex;

/// The authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Stable user id; owns the remote task collection.
    pub uid: String,
    /// Account email, for display only.
    pub email: String,
}

impl AuthUser {
    /// Convenience constructor.
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
        }
    }
}

/// Holder of the current sign-in state.
///
/// Cheap to clone a snapshot out of; the single owner (the repository)
/// drives transitions via [`sign_in`](Self::sign_in) /
/// [`sign_out`](Self::sign_out).
#[derive(Debug, Default)]
pub struct SessionContext {
    user: Mutex<Option<AuthUser>>,
}

impl SessionContext {
    /// Creates a signed-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sign-in, replacing any previous user.
    pub fn sign_in(&self, user: AuthUser) {
        *self.user.lock() = Some(user);
    }

    /// Clears the session, returning the user that was signed in.
    pub fn sign_out(&self) -> Option<AuthUser> {
        self.user.lock().take()
    }

    /// Snapshot of the current user, if any.
    #[must_use]
    pub fn current(&self) -> Option<AuthUser> {
        self.user.lock().clone()
    }

    /// The current uid, if somebody is signed in.
    #[must_use]
    pub fn current_uid(&self) -> Option<String> {
        self.user.lock().as_ref().map(|u| u.uid.clone())
    }
}
