//! Capability token claims

use serde::{Deserialize, Serialize};

/// JWT claims proving a catalog item was physically scanned
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanClaims {
    pub book_isbn: String,
    pub scanned: bool,
    pub iat: i64,
    pub exp: i64,
}

impl ScanClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token; expiry is checked without leeway
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;
        Ok(token_data.claims)
    }
}
