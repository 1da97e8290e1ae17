//! Authentication utilities library
//!
//! Provides the credential primitives used by the rosary service:
//! - Password hashing (Argon2id) with configurable cost
//! - JWT token generation and validation
//! - Access/refresh token issuance over two independent signing contexts
//!
//! The service defines its own ports and adapts these implementations, so no
//! domain logic lives here.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::{HashingParams, PasswordHasher};
//!
//! let hasher = PasswordHasher::new(HashingParams::relaxed()).unwrap();
//! let hash = hasher.hash("my_password").unwrap();
//! let is_valid = hasher.verify("my_password", &hash).unwrap();
//! assert!(is_valid);
//! ```
//!
//! ## JWT Tokens
//! ```
//! use auth::{Claims, JwtSigner, TokenKind};
//! use chrono::{Duration, Utc};
//!
//! let signer = JwtSigner::new(TokenKind::Access, b"secret_key_at_least_32_bytes_long!", None);
//! let claims = Claims::new("user123", TokenKind::Access, Utc::now(), Duration::minutes(1));
//! let token = signer.sign(&claims).unwrap();
//! assert_eq!(signer.verify(&token).unwrap().sub, "user123");
//! ```
//!
//! ## Token Pairs
//! ```
//! use auth::{TokenIssuer, TokenSettings};
//! use chrono::{Duration, Utc};
//!
//! let issuer = TokenIssuer::new(TokenSettings {
//!     access_secret: b"access_secret_key_at_least_32_bytes!".to_vec(),
//!     refresh_secret: b"refresh_secret_key_at_least_32_bytes".to_vec(),
//!     access_ttl: Duration::minutes(15),
//!     refresh_ttl: Duration::days(7),
//!     issuer: None,
//! });
//!
//! let pair = issuer.issue_pair("user123", Utc::now()).unwrap();
//! let claims = issuer.verify_refresh(&pair.refresh_token).unwrap();
//! assert_eq!(claims.sub, "user123");
//! ```

pub mod issuer;
pub mod jwt;
pub mod password;

// Re-export commonly used items
pub use issuer::TokenIssuer;
pub use issuer::TokenPair;
pub use issuer::TokenSettings;
pub use jwt::Claims;
pub use jwt::JwtError;
pub use jwt::JwtSigner;
pub use jwt::TokenKind;
pub use password::HashingParams;
pub use password::PasswordError;
pub use password::PasswordHasher;
