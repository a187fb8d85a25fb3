//! Authentication types for the domain layer.
//!
//! Token validation lives in an upstream auth collaborator. Once it has
//! verified a caller it inserts an [`AuthenticatedUser`] into the request
//! extensions; admission control only ever reads the user id from it.
//!
//! # Example
//!
//! ```ignore
//! // In the auth middleware, after token validation:
//! let user = AuthenticatedUser::new(UserId::new("user-123")?);
//! request.extensions_mut().insert(user);
//! ```

use super::UserId;

/// Caller identity supplied by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// The unique user identifier from the auth provider.
    pub id: UserId,
}

impl AuthenticatedUser {
    /// Creates a new authenticated user.
    pub fn new(id: UserId) -> Self {
        Self { id }
    }
}
