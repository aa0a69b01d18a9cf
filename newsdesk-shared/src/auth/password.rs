//! Password hashing module using Argon2id
//!
//! Passwords are hashed with Argon2id and stored as PHC strings, so the
//! salt and cost parameters travel with the hash. Verification always uses
//! the parameters embedded in the stored hash, which lets the cost be raised
//! later without invalidating existing accounts.
//!
//! # Security
//!
//! - **Algorithm**: Argon2id, version 0x13
//! - **Memory**: 64 MB (65536 KB)
//! - **Iterations**: 3 passes
//! - **Parallelism**: 4 lanes
//! - **Output**: 32-byte hash
//! - **Salt**: 16 random bytes from the OS RNG
//!
//! Hashing is CPU and memory bound. Async callers go through [`HashingPool`],
//! which moves the work onto the blocking thread pool and bounds how many
//! hashes run at once.
//!
//! # Example
//!
//! ```
//! use newsdesk_shared::auth::password::CredentialHasher;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hasher = CredentialHasher::new()?;
//! let hash = hasher.hash("super_secret_password_123")?;
//!
//! assert!(hasher.verify(&hash, "super_secret_password_123"));
//! assert!(!hasher.verify(&hash, "wrong_password"));
//! # Ok(())
//! # }
//! ```
use std::num::NonZeroUsize;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, ParamsBuilder, Version,
};
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::Semaphore;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Cost parameters rejected by argon2
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),

    /// The hashing pool has been shut down
    #[error("Hashing pool is unavailable")]
    Unavailable,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl HashCost {
    fn params(&self) -> Result<Params, PasswordError> {
        ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .output_len(32)
            .build()
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))
    }
}

/// One-way password hasher
///
/// The cost is fixed at construction. The hasher also owns a hash of a
/// random throw-away secret ([`CredentialHasher::dummy_hash`]) so that a login
/// for an unknown account can pay for the same verification as a real one.
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    cost: HashCost,
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

impl CredentialHasher {
    /// Creates a hasher with the default production cost
    ///
    /// # Errors
    ///
    /// Returns `PasswordError` if the dummy hash cannot be computed
    pub fn new() -> Result<Self, PasswordError> {
        Self::with_cost(HashCost::default())
    }

    /// Creates a hasher with an explicit cost
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::InvalidParams` if argon2 rejects the cost
    pub fn with_cost(cost: HashCost) -> Result<Self, PasswordError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, cost.params()?);

        let throwaway: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let dummy_hash = hash_with(&argon2, &throwaway)?;

        Ok(Self {
            argon2,
            cost,
            dummy_hash,
        })
    }

    /// Cost this hasher produces new hashes with
    pub fn cost(&self) -> HashCost {
        self.cost
    }

    /// Hashes a password
    ///
    /// # Returns
    ///
    /// PHC string format hash (includes algorithm, parameters, salt, and hash)
    ///
    /// ```text
    /// $argon2id$v=19$m=65536,t=3,p=4$c2FsdHNhbHRzYWx0$hash...
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::HashError` if argon2 fails
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_with(&self.argon2, password)
    }

    /// Verifies a password against a stored hash
    ///
    /// Returns `false` for a mismatch, an unparseable hash, or any argon2
    /// failure. Callers cannot tell these apart.
    pub fn verify(&self, hash: &str, password: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };

        // Params come from the parsed hash, not from self.cost
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hash of a random secret nobody knows
    pub fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Default number of concurrent hash operations: one per CPU
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Bounded async front for [`CredentialHasher`]
///
/// Each operation waits for a semaphore permit, then runs on
/// `tokio::task::spawn_blocking`. If the awaiting request is dropped, the
/// blocking computation still runs to completion and its result is thrown
/// away; the permit is released when it finishes.
#[derive(Clone, Debug)]
pub struct HashingPool {
    hasher: Arc<CredentialHasher>,
    permits: Arc<Semaphore>,
}

impl HashingPool {
    /// Wraps a hasher, allowing at most `concurrency` operations at once
    pub fn new(hasher: CredentialHasher, concurrency: usize) -> Self {
        Self {
            hasher: Arc::new(hasher),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// The wrapped hasher
    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Hashes a password off the async runtime
    pub async fn hash(&self, password: String) -> Result<String, PasswordError> {
        self.run(move |hasher| hasher.hash(&password)).await?
    }

    /// Verifies a password off the async runtime
    ///
    /// Pool failures are reported as a failed verification.
    pub async fn verify(&self, hash: String, password: String) -> bool {
        self.run(move |hasher| hasher.verify(&hash, &password))
            .await
            .unwrap_or(false)
    }

    /// Burns one verification against the dummy hash; always `false`
    pub async fn verify_dummy(&self, password: String) -> bool {
        self.run(move |hasher| hasher.verify(hasher.dummy_hash(), &password))
            .await
            .unwrap_or(false)
    }

    async fn run<T, F>(&self, work: F) -> Result<T, PasswordError>
    where
        T: Send + 'static,
        F: FnOnce(&CredentialHasher) -> T + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PasswordError::Unavailable)?;
        let hasher = Arc::clone(&self.hasher);

        tokio::task::spawn_blocking(move || {
            let result = work(&hasher);
            drop(permit);
            result
        })
        .await
        .map_err(|e| PasswordError::HashError(format!("hashing task failed: {}", e)))
    }
}

/// Validates password strength
///
/// Checks that password meets minimum security requirements:
/// - At least 8 characters long
/// - Contains at least one uppercase letter
/// - Contains at least one lowercase letter
/// - Contains at least one digit
/// - Contains at least one special character
///
/// # Example
///
/// ```
/// use newsdesk_shared::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("MyP@ssw0rd!").is_ok());
/// assert!(validate_password_strength("Sh0rt!").is_err());
/// assert!(validate_password_strength("Password123").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_numeric()) {
        return Err("Password must contain at least one digit".to_string());
    }

    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}
