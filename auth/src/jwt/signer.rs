use jsonwebtoken::decode;
use jsonwebtoken::encode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;

use super::claims::Claims;
use super::claims::TokenKind;
use super::errors::JwtError;

/// HS256 signer bound to one signing context.
///
/// Verification requires `exp` and `sub`, applies no expiry leeway, checks
/// `iss` when an issuer is configured and rejects tokens of another kind.
pub struct JwtSigner {
    kind: TokenKind,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSigner {
    /// Create a signer for `kind` tokens.
    ///
    /// # Arguments
    /// * `kind` - Signing context this signer accepts
    /// * `secret` - HMAC secret, at least 32 bytes recommended
    /// * `issuer` - Expected `iss` claim, if any
    pub fn new(kind: TokenKind, secret: &[u8], issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }

        Self {
            kind,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// # Errors
    /// * `InvalidToken` - Claims belong to another signing context
    /// * `EncodingFailed` - Token encoding failed
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        if claims.kind != self.kind {
            return Err(JwtError::InvalidToken(format!(
                "cannot sign a {:?} token with the {:?} key",
                claims.kind, self.kind
            )));
        }

        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }

    /// Decode and validate a token of this signer's kind.
    ///
    /// # Errors
    /// * `TokenExpired` - Token has expired
    /// * `InvalidSignature` - Token was not signed with this secret
    /// * `MissingClaim` - A mandatory claim is absent
    /// * `InvalidToken` - Wrong issuer or wrong kind
    /// * `DecodingFailed` - Token is malformed
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::MissingRequiredClaim(claim) => JwtError::MissingClaim(claim.clone()),
                ErrorKind::InvalidIssuer => JwtError::InvalidToken("unexpected issuer".to_string()),
                _ => JwtError::DecodingFailed(e.to_string()),
            })?
            .claims;

        if claims.kind != self.kind {
            return Err(JwtError::InvalidToken(format!(
                "expected a {:?} token",
                self.kind
            )));
        }

        Ok(claims)
    }
}
