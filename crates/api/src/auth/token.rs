//! HS256 access tokens.
//!
//! A token is the whole session: it names the profile and its role and
//! expires on its own. Keys are derived once from [`JwtConfig`] and shared
//! through [`TokenSigner`].

use atelier_core::types::DbId;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer written into and required from every token.
const ISSUER: &str = "atelier";

const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 60;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_mins: i64,
}

impl JwtConfig {
    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `JWT_SECRET`             | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS` | no       | `60`    |
    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .expect("JWT_SECRET must be set to a non-empty value");

        let access_token_expiry_mins = std::env::var("JWT_ACCESS_EXPIRY_MINS")
            .map(|v| v.parse().expect("JWT_ACCESS_EXPIRY_MINS must be a valid i64"))
            .unwrap_or(DEFAULT_ACCESS_EXPIRY_MINS);

        Self {
            secret,
            access_token_expiry_mins,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Profile id.
    pub sub: DbId,
    pub role: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// A freshly signed token and its lifetime in seconds.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: i64,
}

pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime_secs: i64,
}

impl TokenSigner {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        // jsonwebtoken only recognises a string `sub`; the numeric one is
        // enforced by `Claims` deserialization instead.
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            lifetime_secs: config.access_token_expiry_mins * 60,
        }
    }

    pub fn issue(&self, user_id: DbId, role: &str) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            role: role.to_string(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + self.lifetime_secs,
            jti: Uuid::new_v4(),
        };
        let access_token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken {
            access_token,
            expires_in: self.lifetime_secs,
        })
    }

    /// Check signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("lifetime_secs", &self.lifetime_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(&JwtConfig {
            secret: secret.to_string(),
            access_token_expiry_mins: 60,
        })
    }

    #[test]
    fn issued_token_verifies_with_subject_and_role() {
        let signer = signer("test-secret-that-is-long-enough-for-hmac");
        let issued = signer.issue(42, "admin").unwrap();
        assert_eq!(issued.expires_in, 3600);

        let claims = signer.verify(&issued.access_token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn token_without_subject_is_rejected() {
        let signer = signer("test-secret-that-is-long-enough-for-hmac");
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "role": "user",
            "iss": ISSUER,
            "iat": now,
            "exp": now + 600,
            "jti": Uuid::new_v4(),
        });
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret-that-is-long-enough-for-hmac"),
        )
        .unwrap();

        assert!(signer.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = signer("test-secret-that-is-long-enough-for-hmac");
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: 1,
            role: "user".into(),
            iss: ISSUER.into(),
            iat: now - 600,
            // Past the default 60 s leeway.
            exp: now - 300,
            jti: Uuid::new_v4(),
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &signer.encoding).unwrap();

        assert!(signer.verify(&token).is_err());
    }

    #[test]
    fn foreign_secret_or_issuer_is_rejected() {
        let ours = signer("test-secret-that-is-long-enough-for-hmac");
        let theirs = signer("a-different-secret");
        let token = theirs.issue(1, "user").unwrap().access_token;
        assert!(ours.verify(&token).is_err());

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: 1,
            role: "user".into(),
            iss: "someone-else".into(),
            iat: now,
            exp: now + 60,
            jti: Uuid::new_v4(),
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &ours.encoding).unwrap();
        assert!(ours.verify(&token).is_err());
    }
}
