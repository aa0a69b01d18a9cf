//! Authentication and authorization
//!
//! # Modules
//!
//! - [`password`]: Argon2id hashing and the bounded hashing pool
//! - [`jwt`]: HS256 access/refresh tokens, validation and revocation
//! - [`cookie`]: session cookie parsing and `Set-Cookie` building
//! - [`middleware`]: the per-request authentication state machine
//! - [`authorization`]: role and ownership gates
//!
//! # Example
//!
//! ```
//! use newsdesk_shared::auth::jwt::{TokenConfig, TokenService, TokenType};
//! use newsdesk_shared::auth::password::{CredentialHasher, HashCost};
//! use newsdesk_shared::models::user::{Role, UserIdentity};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hasher = CredentialHasher::with_cost(HashCost::default())?;
//! let hash = hasher.hash("user_password")?;
//! assert!(hasher.verify(&hash, "user_password"));
//!
//! let tokens = TokenService::new(TokenConfig::new(
//!     "a-secret-of-at-least-thirty-two-bytes!!", 60, 168, "newsdesk",
//! ));
//! let identity = UserIdentity {
//!     id: 1,
//!     username: "editor".to_string(),
//!     email: "editor@example.com".to_string(),
//!     role: Role::Editor,
//! };
//! let refresh = tokens.issue(&identity, TokenType::Refresh)?;
//! let access = tokens.refresh_access_token(&refresh.token)?;
//! assert_eq!(access.claims.role, Role::Editor);
//! # Ok(())
//! # }
//! ```

pub mod authorization;
pub mod cookie;
pub mod jwt;
pub mod middleware;
pub mod password;
