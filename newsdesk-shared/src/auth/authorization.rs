//! Authorization helpers and permission checks
//!
//! Role gates admit an explicit set of roles. There is no hierarchy: a gate
//! for `[Admin, Editor]` does not implicitly admit anyone else.
//!
//! Content ownership follows the newsroom rule that authors may only touch
//! their own content while staff (admins and editors) may touch anyone's.
//!
//! # Example
//!
//! ```
//! use newsdesk_shared::auth::authorization::{require_owner_or_role, require_role, STAFF};
//! use newsdesk_shared::models::user::{Role, UserIdentity};
//!
//! let author = UserIdentity {
//!     id: 9,
//!     username: "writer".to_string(),
//!     email: "writer@example.com".to_string(),
//!     role: Role::Author,
//! };
//!
//! assert!(require_role(&author, STAFF).is_err());
//! assert!(require_owner_or_role(&author, 9, STAFF).is_ok());
//! assert!(require_owner_or_role(&author, 10, STAFF).is_err());
//! ```

use crate::models::user::{Role, UserIdentity};

/// Admin only
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Admins and editors
pub const STAFF: &[Role] = &[Role::Admin, Role::Editor];

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// User's role is not in the admitted set
    #[error("Insufficient permissions: requires one of {required:?}, has {actual}")]
    InsufficientRole { required: Vec<Role>, actual: Role },

    /// User doesn't own the resource
    #[error("Not authorized to access this resource")]
    NotAuthorized,
}

/// Checks that the user's role is one of `allowed`
///
/// # Errors
///
/// Returns `AuthzError::InsufficientRole` otherwise
pub fn require_role(user: &UserIdentity, allowed: &[Role]) -> Result<(), AuthzError> {
    if !allowed.contains(&user.role) {
        return Err(AuthzError::InsufficientRole {
            required: allowed.to_vec(),
            actual: user.role,
        });
    }

    Ok(())
}

/// Checks if user owns a resource
pub fn require_ownership(user: &UserIdentity, resource_owner_id: u64) -> Result<(), AuthzError> {
    if user.id != resource_owner_id {
        return Err(AuthzError::NotAuthorized);
    }

    Ok(())
}

/// Allows the resource owner, or anyone whose role is in `allowed`
pub fn require_owner_or_role(
    user: &UserIdentity,
    resource_owner_id: u64,
    allowed: &[Role],
) -> Result<(), AuthzError> {
    if user.id == resource_owner_id {
        return Ok(());
    }

    require_role(user, allowed)
}
