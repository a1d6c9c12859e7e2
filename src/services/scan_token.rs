//! Capability token codec for scanned items

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::scan_token::ScanClaims,
    scanner::isbn::normalize_isbn,
};

/// Cookie carrying the capability token
pub const SCAN_COOKIE: &str = "scanned_book";
/// Header alternative for non-browser clients
pub const SCAN_TOKEN_HEADER: &str = "x-scan-token";

/// A freshly minted token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ScanTokenService {
    secret: String,
    ttl: Duration,
}

impl ScanTokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            secret: config.scan_token_secret.clone(),
            ttl: Duration::minutes(config.scan_token_ttl_minutes as i64),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `identifier`
    pub fn issue(&self, identifier: &str) -> AppResult<IssuedToken> {
        self.issue_at(identifier, Utc::now())
    }

    fn issue_at(&self, identifier: &str, now: DateTime<Utc>) -> AppResult<IssuedToken> {
        let identifier = normalize_isbn(identifier);
        let expires_at = now + self.ttl;
        let claims = ScanClaims {
            book_isbn: identifier.clone(),
            scanned: true,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = claims
            .create_token(&self.secret)
            .map_err(|e| AppError::Internal(format!("Failed to create scan token: {}", e)))?;

        Ok(IssuedToken {
            token,
            identifier,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    /// Verify a token and return the scanned identifier.
    ///
    /// Expired, forged and incomplete tokens all fail the same way.
    pub fn verify(&self, token: &str) -> AppResult<String> {
        let claims = ScanClaims::from_token(token, &self.secret)
            .map_err(|e| AppError::TokenInvalid(e.to_string()))?;

        if !claims.scanned || claims.book_isbn.is_empty() {
            return Err(AppError::TokenInvalid("incomplete scan claims".to_string()));
        }
        Ok(claims.book_isbn)
    }
}
