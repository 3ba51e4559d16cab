//! JWT issuance and verification.
//!
//! Mints and verifies the HS256 JWTs returned from
//! `POST /api/v1/auth/token` (30 day expiry, payload
//! `{sessionId, userId?, iat, exp}`). `sessionId` is the *only* identity the
//! rest of the system trusts — every downstream component reads it from a
//! verified [`Claims`], never from a client-supplied field.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const TOKEN_TTL_DAYS: i64 = 30;

/// Canonical session identity carried in every JWT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> crate::auth::SessionIdentity {
        crate::auth::SessionIdentity {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// Mints and verifies JWTs against a single HS256 secret.
///
/// The secret is validated at config load time — this
/// type itself does not re-validate length, it only signs/verifies.
#[derive(Clone)]
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a fresh token for the given canonical session identity.
    ///
    /// Each call mints a brand-new `sessionId` — callers that want a stable
    /// identity across calls must supply one explicitly via
    /// [`JwtCodec::issue_for`].
    pub fn issue(&self, user_id: Option<String>) -> anyhow::Result<(String, String)> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let token = self.issue_for(&session_id, user_id)?;
        Ok((token, session_id))
    }

    /// Issue a token bound to an explicit `sessionId`.
    pub fn issue_for(&self, session_id: &str, user_id: Option<String>) -> anyhow::Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            session_id: session_id.to_string(),
            user_id,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> JwtCodec {
        JwtCodec::new("test-secret-at-least-32-characters-long")
    }

    #[test]
    fn issued_token_verifies_and_round_trips_session_id() {
        let codec = codec();
        let (token, session_id) = codec.issue(Some("user-1".into())).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.session_id, session_id);
        assert_eq!(claims.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn verify_rejects_tampered_token() {
        let codec = codec();
        let (mut token, _) = codec.issue(None).unwrap();
        token.push('x');
        assert!(codec.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_token_signed_with_different_secret() {
        let a = JwtCodec::new("secret-one-at-least-32-characters!!");
        let b = JwtCodec::new("secret-two-at-least-32-characters!!");
        let (token, _) = a.issue(None).unwrap();
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn issue_for_preserves_caller_supplied_session_id() {
        let codec = codec();
        let token = codec.issue_for("fixed-session-id", None).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.session_id, "fixed-session-id");
    }
}
