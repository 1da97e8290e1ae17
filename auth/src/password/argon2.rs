use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher as Argon2PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use argon2::Algorithm;
use argon2::Argon2;
use argon2::Params;
use argon2::Version;

use super::errors::PasswordError;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingParams {
    /// Memory cost in KiB
    pub memory_cost_kib: u32,
    /// Number of passes
    pub time_cost: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl HashingParams {
    /// Minimal cost accepted by Argon2id.
    ///
    /// Only meant for test configurations where hashing speed matters more
    /// than resistance to offline attacks.
    pub fn relaxed() -> Self {
        Self {
            memory_cost_kib: Params::MIN_M_COST,
            time_cost: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

impl Default for HashingParams {
    fn default() -> Self {
        Self {
            memory_cost_kib: Params::DEFAULT_M_COST,
            time_cost: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Password hashing implementation.
///
/// Provides cryptographic password hashing (internally uses Argon2id).
/// The same hasher is used for any secret that must only be stored as a
/// one-way digest, refresh tokens included.
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create a new password hasher with explicit cost parameters.
    ///
    /// # Arguments
    /// * `params` - Argon2id memory, time and parallelism costs
    ///
    /// # Returns
    /// PasswordHasher instance
    ///
    /// # Errors
    /// * `InvalidParameters` - Parameters rejected by Argon2 (e.g. memory below 8 KiB per lane)
    pub fn new(params: HashingParams) -> Result<Self, PasswordError> {
        let params = Params::new(
            params.memory_cost_kib,
            params.time_cost,
            params.parallelism,
            None,
        )
        .map_err(|e| PasswordError::InvalidParameters(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext secret.
    ///
    /// Uses Argon2id with random salt generation.
    ///
    /// # Arguments
    /// * `password` - Plaintext secret to hash
    ///
    /// # Returns
    /// PHC string format hash (includes algorithm, parameters, salt, and hash)
    ///
    /// # Errors
    /// * `HashingFailed` - Hashing operation failed
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }

    /// Verify a plaintext secret against a stored hash.
    ///
    /// The cost parameters recorded in the hash are used, so digests produced
    /// under an older configuration keep verifying.
    ///
    /// # Arguments
    /// * `password` - Plaintext secret to verify
    /// * `hash` - Stored hash in PHC string format
    ///
    /// # Returns
    /// True if the secret matches, false otherwise
    ///
    /// # Errors
    /// * `VerificationFailed` - Hash format is invalid
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            PasswordError::VerificationFailed(format!("Invalid password hash: {}", e))
        })?;

        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relaxed_hasher() -> PasswordHasher {
        PasswordHasher::new(HashingParams::relaxed()).expect("relaxed params are valid")
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = relaxed_hasher();
        let password = "my_secure_password";

        let hash = hasher.hash(password).expect("Failed to hash password");

        assert!(hasher
            .verify(password, &hash)
            .expect("Failed to verify password"));

        assert!(!hasher
            .verify("wrong_password", &hash)
            .expect("Failed to verify password"));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = relaxed_hasher();

        let first = hasher.hash("same input").unwrap();
        let second = hasher.hash("same input").unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
    }

    #[test]
    fn test_verify_uses_params_from_hash() {
        let strong = PasswordHasher::new(HashingParams {
            memory_cost_kib: 64,
            time_cost: 2,
            parallelism: 1,
        })
        .unwrap();
        let hash = strong.hash("password").unwrap();

        assert!(relaxed_hasher().verify("password", &hash).unwrap());
        assert!(hash.contains("m=64,t=2,p=1"));
    }

    #[test]
    fn test_verify_invalid_hash() {
        let hasher = relaxed_hasher();
        let result = hasher.verify("password", "invalid_hash");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_memory_below_minimum() {
        let result = PasswordHasher::new(HashingParams {
            memory_cost_kib: 1,
            time_cost: 1,
            parallelism: 1,
        });
        assert!(matches!(result, Err(PasswordError::InvalidParameters(_))));
    }
}
