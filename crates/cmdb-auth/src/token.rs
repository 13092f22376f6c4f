//! Login token issuance.
//!
//! Tokens are HS256 JSON Web Tokens carrying the user id and, in cloud mode,
//! the tenant database.
//!
//! # Example Claims
//!
//! ```json
//! {
//!   "sub": "42",
//!   "tenant": "acme",
//!   "iat": 1735603200,
//!   "exp": 1735687200,
//!   "iss": "cmdb"
//! }
//! ```

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Default issuer claim.
pub const DEFAULT_ISSUER: &str = "cmdb";

/// What a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    /// Public id of the authenticated user.
    pub subject_id: u64,
    /// Tenant database, cloud mode only.
    pub tenant: Option<String>,
}

/// An issued token with its validity window (Unix seconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Issues signed tokens.
pub trait TokenIssuer: Send + Sync {
    /// Issue a token valid for `lifetime_secs` seconds.
    fn issue(&self, payload: &TokenPayload, lifetime_secs: u64) -> AuthResult<IssuedToken>;
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id).
    pub sub: String,

    /// Tenant database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Issued at time (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issuer.
    pub iss: String,
}

/// HMAC-signed JWT issuer.
pub struct JwtTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    leeway_secs: u64,
}

impl JwtTokenIssuer {
    /// Create a new issuer with an HMAC secret.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: DEFAULT_ISSUER.to_string(),
            leeway_secs: 60,
        }
    }

    /// Set the issuer claim written and required on verification.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set the leeway for expiration check.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Verify a token and extract its claims.
    pub fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        let token = token
            .strip_prefix("Bearer ")
            .or_else(|| token.strip_prefix("bearer "))
            .unwrap_or(token);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::Token(format!("verification failed: {}", e)))?;
        Ok(data.claims)
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, payload: &TokenPayload, lifetime_secs: u64) -> AuthResult<IssuedToken> {
        let issued_at = chrono::Utc::now().timestamp();
        let lifetime = i64::try_from(lifetime_secs)
            .map_err(|_| AuthError::Token(format!("token lifetime too large: {}", lifetime_secs)))?;
        let expires_at = issued_at.saturating_add(lifetime);

        let claims = TokenClaims {
            sub: payload.subject_id.to_string(),
            tenant: payload.tenant.clone(),
            iat: issued_at,
            exp: expires_at,
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Token(format!("signing failed: {}", e)))?;

        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }
}
