//! Identity token signing and verification.
//!
//! The hub does not issue credentials; it only checks them. The reference
//! token format understood by the server is:
//!
//! ```text
//! {user_id}.{role}.{expires_at_unix}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{user_id}.{role}.{expires_at_unix}", secret)`.
//! A token is accepted only while `expires_at` lies in the future.

use crate::objects::identity::{Identity, Role};
use time::OffsetDateTime;
use uuid::Uuid;

/// Header carrying the plaintext ingest secret on `/internal/*` endpoints.
pub const INGEST_KEY_HEADER: &str = "Cvewire-Ingest-Key";

/// Query parameter carrying the identity token on `GET /ws` (browsers
/// cannot set headers on WebSocket upgrades).
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("token expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn claims(user_id: Uuid, role: Role, expires_at: i64) -> String {
    format!("{user_id}.{role}.{expires_at}")
}

/// Sign an identity into a bearer token.
pub fn sign_identity_token(identity: &Identity, key: &[u8]) -> String {
    let claims = claims(
        identity.user_id,
        identity.role,
        identity.expires_at.unix_timestamp(),
    );
    let sig = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        claims.as_bytes(),
    );
    format!(
        "{}.{}",
        claims,
        fast32::base64::RFC4648_NOPAD.encode(sig.as_ref())
    )
}

/// Verify a bearer token and return the identity it carries.
///
/// The HMAC is checked before any claim is interpreted.
pub fn verify_identity_token(token: &str, key: &[u8]) -> Result<Identity, SignatureError> {
    let (claims, signature) = token.rsplit_once('.').ok_or(SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(signature)
        .map_err(|_| SignatureError::InvalidBase64)?;

    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        claims.as_bytes(),
        &signature,
    )?;

    let mut parts = claims.split('.');
    let (Some(user_id), Some(role), Some(expires_at), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SignatureError::InvalidFormat);
    };

    let user_id = Uuid::parse_str(user_id).map_err(|_| SignatureError::InvalidFormat)?;
    let role: Role = role.parse().map_err(|_| SignatureError::InvalidFormat)?;
    let expires_at: i64 = expires_at
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let expires_at = OffsetDateTime::from_unix_timestamp(expires_at)
        .map_err(|_| SignatureError::InvalidFormat)?;

    if expires_at <= OffsetDateTime::now_utc() {
        return Err(SignatureError::Expired);
    }

    Ok(Identity {
        user_id,
        role,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"token-secret";

    fn identity(expires_in: time::Duration) -> Identity {
        let expires_at = OffsetDateTime::now_utc() + expires_in;
        Identity {
            user_id: Uuid::new_v4(),
            role: Role::Analyst,
            // Tokens carry whole seconds.
            expires_at: OffsetDateTime::from_unix_timestamp(expires_at.unix_timestamp()).unwrap(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = identity(time::Duration::hours(1));
        let token = sign_identity_token(&identity, KEY);
        assert_eq!(verify_identity_token(&token, KEY).unwrap(), identity);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = sign_identity_token(&identity(time::Duration::hours(1)), KEY);
        assert!(matches!(
            verify_identity_token(&token, b"other"),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_tampered_role_is_rejected() {
        let token = sign_identity_token(&identity(time::Duration::hours(1)), KEY);
        let tampered = token.replacen(".analyst.", ".admin.", 1);
        assert!(matches!(
            verify_identity_token(&tampered, KEY),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = sign_identity_token(&identity(-time::Duration::minutes(1)), KEY);
        assert!(matches!(
            verify_identity_token(&token, KEY),
            Err(SignatureError::Expired)
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            verify_identity_token("garbage", KEY),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            verify_identity_token("a.b.c.!!!", KEY),
            Err(SignatureError::InvalidBase64)
        ));
    }
}
