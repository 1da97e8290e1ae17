use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::jwt::Claims;
use crate::jwt::JwtError;
use crate::jwt::JwtSigner;
use crate::jwt::TokenKind;

/// Secrets and lifetimes for the two signing contexts.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: Option<String>,
}

/// Freshly issued access/refresh pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry embedded in the refresh token
    pub refresh_expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Issues and verifies access and refresh tokens.
///
/// Access and refresh tokens are signed with independent secrets, so a token
/// from one context never verifies in the other even before the `kind` claim
/// is looked at.
pub struct TokenIssuer {
    access: JwtSigner,
    refresh: JwtSigner,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: Option<String>,
}

impl TokenIssuer {
    /// Create a new token issuer.
    ///
    /// # Arguments
    /// * `settings` - Secrets, lifetimes and optional `iss` value
    pub fn new(settings: TokenSettings) -> Self {
        let issuer = settings.issuer.as_deref();
        Self {
            access: JwtSigner::new(TokenKind::Access, &settings.access_secret, issuer),
            refresh: JwtSigner::new(TokenKind::Refresh, &settings.refresh_secret, issuer),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            issuer: settings.issuer,
        }
    }

    /// Sign a new access/refresh pair for a subject.
    ///
    /// # Arguments
    /// * `subject` - Opaque subject identifier (user id)
    /// * `now` - Issue instant shared by both tokens
    ///
    /// # Errors
    /// * `EncodingFailed` - Token encoding failed
    pub fn issue_pair(&self, subject: &str, now: DateTime<Utc>) -> Result<TokenPair, JwtError> {
        let access_claims = Claims::new(subject, TokenKind::Access, now, self.access_ttl)
            .with_issuer(self.issuer.clone());
        let refresh_claims = Claims::new(subject, TokenKind::Refresh, now, self.refresh_ttl)
            .with_issuer(self.issuer.clone());

        let refresh_expires_at = refresh_claims
            .expires_at()
            .ok_or_else(|| JwtError::InvalidToken("expiry out of range".to_string()))?;

        Ok(TokenPair {
            access_token: self.access.sign(&access_claims)?,
            refresh_token: self.refresh.sign(&refresh_claims)?,
            refresh_expires_at,
        })
    }

    /// Verify an access token.
    ///
    /// # Errors
    /// See [`JwtSigner::verify`]
    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.access.verify(token)
    }

    /// Verify a refresh token.
    ///
    /// # Errors
    /// See [`JwtSigner::verify`]
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.refresh.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TokenSettings {
        TokenSettings {
            access_secret: b"access_secret_key_at_least_32_bytes!".to_vec(),
            refresh_secret: b"refresh_secret_key_at_least_32_bytes".to_vec(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            issuer: Some("rosary".to_string()),
        }
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let issuer = TokenIssuer::new(settings());
        let now = Utc::now();

        let pair = issuer.issue_pair("user123", now).expect("Failed to issue pair");

        let access = issuer
            .verify_access(&pair.access_token)
            .expect("Access token should verify");
        let refresh = issuer
            .verify_refresh(&pair.refresh_token)
            .expect("Refresh token should verify");

        assert_eq!(access.sub, "user123");
        assert_eq!(refresh.sub, "user123");
        assert_eq!(refresh.iss, Some("rosary".to_string()));
        assert_eq!(
            pair.refresh_expires_at.timestamp(),
            (now + Duration::days(7)).timestamp()
        );
    }

    #[test]
    fn test_contexts_do_not_cross_verify() {
        let issuer = TokenIssuer::new(settings());
        let pair = issuer.issue_pair("user123", Utc::now()).unwrap();

        assert_eq!(
            issuer.verify_refresh(&pair.access_token).unwrap_err(),
            JwtError::InvalidSignature
        );
        assert_eq!(
            issuer.verify_access(&pair.refresh_token).unwrap_err(),
            JwtError::InvalidSignature
        );
    }

    #[test]
    fn test_kind_checked_when_secrets_are_shared() {
        let mut shared = settings();
        shared.refresh_secret = shared.access_secret.clone();
        let issuer = TokenIssuer::new(shared);
        let pair = issuer.issue_pair("user123", Utc::now()).unwrap();

        assert!(matches!(
            issuer.verify_refresh(&pair.access_token),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_pairs_issued_in_same_instant_differ() {
        let issuer = TokenIssuer::new(settings());
        let now = Utc::now();

        let first = issuer.issue_pair("user123", now).unwrap();
        let second = issuer.issue_pair("user123", now).unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(first.access_token, second.access_token);
    }

    #[test]
    fn test_expired_refresh_token() {
        let issuer = TokenIssuer::new(settings());
        let pair = issuer
            .issue_pair("user123", Utc::now() - Duration::days(8))
            .unwrap();

        assert_eq!(
            issuer.verify_refresh(&pair.refresh_token).unwrap_err(),
            JwtError::TokenExpired
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let issuer = TokenIssuer::new(settings());
        let pair = issuer.issue_pair("user123", Utc::now()).unwrap();

        let rendered = format!("{:?}", pair);
        assert!(!rendered.contains(&pair.refresh_token));
        assert!(rendered.contains("<redacted>"));
    }
}
