//! Token Service
//!
//! Stateless issuance and verification of the access/refresh JWT pair.
//!
//! Each kind is signed with its own secret, so compromise of one secret
//! cannot forge the other kind. Verification is an expected-failure path
//! (users routinely present expired tokens) and therefore reports `None`
//! instead of an error.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{TokenClaims, TokenKind, TokenPair, UserClaims};

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};

/// Signing/verification keys for one token kind.
#[derive(Clone)]
struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KindKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Stateless JWT issuance and verification
#[derive(Clone)]
pub struct TokenService {
    access_keys: KindKeys,
    refresh_keys: KindKeys,
    issuer: String,
    audience: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_keys: KindKeys::from_secret(&config.access_secret),
            refresh_keys: KindKeys::from_secret(&config.refresh_secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access_keys,
            TokenKind::Refresh => &self.refresh_keys,
        }
    }

    fn ttl(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn issue_at(&self, claims: &UserClaims, kind: TokenKind, now: i64) -> Result<String, AuthError> {
        let payload = TokenClaims {
            user_id: claims.user_id,
            email: claims.email.clone(),
            role: claims.role,
            kind,
            jti: uuid::Uuid::new_v4(),
            iat: now,
            exp: now + self.ttl(kind),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::default(), &payload, &self.keys(kind).encoding).map_err(|err| {
            tracing::error!("Token signing failed: {:?}", err);
            AuthError::Internal
        })
    }

    /// Issue a 15-minute access token.
    pub fn issue_access(&self, claims: &UserClaims) -> Result<String, AuthError> {
        self.issue_at(claims, TokenKind::Access, Utc::now().timestamp())
    }

    /// Issue a 7-day refresh token.
    pub fn issue_refresh(&self, claims: &UserClaims) -> Result<String, AuthError> {
        self.issue_at(claims, TokenKind::Refresh, Utc::now().timestamp())
    }

    /// Issue both tokens with the same `iat`.
    pub fn issue_pair(&self, claims: &UserClaims) -> Result<TokenPair, AuthError> {
        let now = Utc::now().timestamp();
        Ok(TokenPair {
            access_token: self.issue_at(claims, TokenKind::Access, now)?,
            refresh_token: self.issue_at(claims, TokenKind::Refresh, now)?,
        })
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Option<TokenClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        // Integer-second expiry with no clock-skew allowance; jsonwebtoken's
        // default leeway of 60s would silently accept elapsed tokens.
        validation.leeway = 0;

        let data = match decode::<TokenClaims>(token, &self.keys(kind).decoding, &validation) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!("Token verification failed: {:?}", err);
                return None;
            }
        };

        // Kind confusion is rejected even when the signature checks out.
        if data.claims.kind != kind {
            tracing::debug!(expected = ?kind, got = ?data.claims.kind, "Token kind mismatch");
            return None;
        }

        Some(data.claims)
    }

    /// Verify an access token; `None` on any failure.
    pub fn verify_access(&self, token: &str) -> Option<TokenClaims> {
        self.verify(token, TokenKind::Access)
    }

    /// Verify a refresh token; `None` on any failure.
    pub fn verify_refresh(&self, token: &str) -> Option<TokenClaims> {
        self.verify(token, TokenKind::Refresh)
    }

    /// Compare a payload's expiry against the current time.
    pub fn is_expired(&self, claims: &TokenClaims) -> bool {
        claims.exp <= Utc::now().timestamp()
    }

    /// Parse an `Authorization: Bearer <token>` header value. Any other
    /// scheme yields `None`.
    pub fn extract_bearer(header: &str) -> Option<&str> {
        let token = header.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    /// Cryptographically strong random alphanumeric string for token needs
    /// outside the JWT pipeline (e.g. email-verification tokens).
    pub fn random_opaque_token(length: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}
