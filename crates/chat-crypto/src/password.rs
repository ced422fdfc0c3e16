//! Argon2id password hashing for the server's user store.
//!
//! `UserRecord` persists a `pwd_hash`/`pwd_salt` pair; this module owns the
//! only code allowed to touch either. Verification is constant-time on the
//! hash output.

use argon2::{Algorithm, Argon2, Params, ParamsBuilder, Version};

use crate::constant_time::ct_eq;
use crate::error::CryptoError;
use crate::random::fill_random;

const SALT_SIZE: usize = 16;
const HASH_SIZE: usize = 32;

/// Argon2id cost parameters. Defaults follow OWASP's password-hashing
/// recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    /// Memory cost in KiB.
    pub memory_cost_kib: u32,
    /// Iteration count.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_cost_kib: 65536, // 64 MiB
            iterations: 4,
            parallelism: 4,
        }
    }
}

impl PasswordParams {
    /// Reduced-cost parameters for fast test iteration. Not for production use.
    #[must_use]
    pub fn low_cost_for_tests() -> Self {
        Self {
            memory_cost_kib: 4096,
            iterations: 2,
            parallelism: 1,
        }
    }

    fn build(self) -> Result<Params, CryptoError> {
        if self.memory_cost_kib < 8 {
            return Err(CryptoError::InvalidParameter(
                "memory_cost_kib must be at least 8 KiB".into(),
            ));
        }
        if self.iterations < 1 {
            return Err(CryptoError::InvalidParameter(
                "iterations must be at least 1".into(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::InvalidParameter(
                "parallelism must be at least 1".into(),
            ));
        }

        ParamsBuilder::new()
            .m_cost(self.memory_cost_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .build()
            .map_err(|e| CryptoError::InvalidParameter(format!("argon2 params: {e}")))
    }
}

/// A hashed password ready for `UserRecord` storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    /// Random per-user salt.
    pub salt: [u8; SALT_SIZE],
    /// Argon2id output.
    pub hash: [u8; HASH_SIZE],
    /// Cost parameters used, stored alongside the hash so verification
    /// doesn't depend on the caller supplying matching parameters.
    pub params: PasswordParams,
}

/// Hash a new password with a freshly generated salt.
///
/// # Errors
///
/// Returns an error if random generation or Argon2 derivation fails.
pub fn hash_password(password: &[u8], params: PasswordParams) -> Result<PasswordHash, CryptoError> {
    let mut salt = [0u8; SALT_SIZE];
    fill_random(&mut salt)?;

    let hash = derive(password, &salt, params)?;

    Ok(PasswordHash {
        salt,
        hash,
        params,
    })
}

/// Verify a candidate password against a stored hash, in constant time.
///
/// # Errors
///
/// Returns an error only if Argon2 derivation itself fails (e.g. corrupt
/// stored parameters); a simple mismatch returns `Ok(false)`.
pub fn verify_password(password: &[u8], stored: &PasswordHash) -> Result<bool, CryptoError> {
    let candidate = derive(password, &stored.salt, stored.params)?;
    Ok(ct_eq(&candidate, &stored.hash))
}

fn derive(
    password: &[u8],
    salt: &[u8; SALT_SIZE],
    params: PasswordParams,
) -> Result<[u8; HASH_SIZE], CryptoError> {
    let argon2_params = params.build()?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut out = [0u8; HASH_SIZE];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|_| CryptoError::HashingFailed)?;
    Ok(out)
}
