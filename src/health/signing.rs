//! HS256 token signing used by the credential probe

use crate::error::ProbeError;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Issuer stamped into every token
pub const ISSUER: &str = "labwatch";

/// Signs and verifies session-style tokens with a shared secret
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    ttl_seconds: i64,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &self.algorithm)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

/// Claims envelope wrapping an arbitrary payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims<T> {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub payload: T,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, 3600)
    }

    pub fn with_ttl(secret: &str, ttl_seconds: i64) -> Self {
        let secret = secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            ttl_seconds,
        }
    }

    /// Sign `payload` into a compact token
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String, ProbeError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
            payload,
        };
        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?)
    }

    /// Verify signature, issuer and expiry and return the payload
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, ProbeError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[ISSUER]);
        let data = decode::<Claims<T>>(token, &self.decoding_key, &validation)?;
        Ok(data.claims.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Probe {
        user_id: String,
        role: String,
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let signer = TokenSigner::new("secret");
        let payload = Probe {
            user_id: "health-check".to_string(),
            role: "probe".to_string(),
        };

        let token = signer.sign(&payload).unwrap();
        let verified: Probe = signer.verify(&token).unwrap();
        assert_eq!(verified, payload);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenSigner::new("one").sign(&"data").unwrap();
        let result = TokenSigner::new("two").verify::<String>(&token);
        assert!(matches!(result, Err(ProbeError::Signing(_))));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // Beyond the default 60s leeway
        let signer = TokenSigner::with_ttl("secret", -120);
        let token = signer.sign(&"data").unwrap();
        assert!(signer.verify::<String>(&token).is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let rendered = format!("{:?}", TokenSigner::new("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }
}
