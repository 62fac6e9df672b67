//! Request context and caller identity resolution
//!
//! The transport layer attaches the caller's identity to a request as a raw
//! string (usually taken from a signed cookie). Storage operations consult
//! the context only to resolve that identity; no deadline or cancellation is
//! carried.

use crate::error::{Error, Result};
use crate::types::User;

/// Per-call context handed to storage operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    identity: Option<String>,
}

impl RequestContext {
    /// Context with no identity attached
    pub fn unauthenticated() -> Self {
        Self { identity: None }
    }

    /// Context for a known user
    pub fn for_user(user: User) -> Self {
        Self {
            identity: Some(user.to_string()),
        }
    }

    /// Context carrying the raw identity value as the transport received it
    pub fn from_raw(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
        }
    }

    /// Raw identity value, if any
    pub fn raw_identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Resolve the caller identity
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthenticated` if no identity is attached or the
    /// attached value is not a decimal integer.
    pub fn user(&self) -> Result<User> {
        self.identity
            .as_deref()
            .and_then(|raw| raw.parse::<User>().ok())
            .ok_or(Error::Unauthenticated)
    }
}

impl From<User> for RequestContext {
    fn from(user: User) -> Self {
        Self::for_user(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_context() {
        let ctx = RequestContext::unauthenticated();
        assert!(ctx.user().unwrap_err().is_unauthenticated());
        assert_eq!(ctx.raw_identity(), None);
    }

    #[test]
    fn test_for_user_roundtrips() {
        let ctx = RequestContext::for_user(User::new(17));
        assert_eq!(ctx.user().unwrap(), User::new(17));
        assert_eq!(ctx.raw_identity(), Some("17"));
    }

    #[test]
    fn test_default_user_resolves() {
        let ctx: RequestContext = User::DEFAULT.into();
        assert_eq!(ctx.user().unwrap(), User::DEFAULT);
    }

    #[test]
    fn test_garbage_identity_is_unauthenticated() {
        let ctx = RequestContext::from_raw("not-a-number");
        assert!(matches!(ctx.user(), Err(Error::Unauthenticated)));
    }
}
