//! HMAC-signed, expiring session tokens.
//!
//! Format: `base64url(payload) "." base64url(HMAC-SHA256(payload, secret))`
//! with no padding. The payload is a small JSON object binding the
//! persistent device id to a display name, an absolute expiry, a random
//! nonce, and, once the device has an account, the profile id, friend
//! code and username.
//!
//! Signature comparison goes through `Mac::verify_slice`, which compares
//! in constant time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime: 14 days.
pub const SESSION_TTL_MS: u64 = 14 * 24 * 60 * 60 * 1000;

/// The signed token payload. Field names are part of the persisted
/// format: existing tokens must keep verifying across releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Persistent device id.
    pub pid: String,
    /// Display name at issue time.
    pub name: String,
    /// Absolute expiry, Unix ms.
    pub exp: u64,
    /// Random nonce so two tokens for the same device never collide.
    pub nonce: u64,
    /// Linked profile id, if the device has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Friend code of the linked profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fc: Option<String>,
    /// Username of the linked account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub un: Option<String>,
}

/// Signs a payload into a wire token.
pub fn mint_token(secret: &[u8], claims: &TokenClaims) -> Result<String, SessionError> {
    let payload =
        serde_json::to_vec(claims).map_err(SessionError::TokenEncode)?;
    let mut mac = HmacSha256::new_from_slice(secret)
        .expect("hmac accepts any key length");
    mac.update(&payload);
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload),
        URL_SAFE_NO_PAD.encode(sig)
    ))
}

/// Verifies a token's signature and expiry, returning its claims.
pub fn verify_token(
    secret: &[u8],
    token: &str,
    now: u64,
) -> Result<TokenClaims, SessionError> {
    let (payload_b64, sig_b64) = token
        .split_once('.')
        .ok_or(SessionError::TokenMalformed)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| SessionError::TokenMalformed)?;
    let sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| SessionError::TokenMalformed)?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .expect("hmac accepts any key length");
    mac.update(&payload);
    mac.verify_slice(&sig)
        .map_err(|_| SessionError::TokenSignature)?;

    let claims: TokenClaims = serde_json::from_slice(&payload)
        .map_err(|_| SessionError::TokenMalformed)?;
    if claims.exp <= now {
        return Err(SessionError::TokenExpired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"unit-test-secret";

    fn claims() -> TokenClaims {
        TokenClaims {
            pid: "device-123456".into(),
            name: "Nova".into(),
            exp: 10_000,
            nonce: 42,
            uid: None,
            fc: None,
            un: None,
        }
    }

    #[test]
    fn test_mint_then_verify_returns_original_claims() {
        let token = mint_token(SECRET, &claims()).unwrap();
        let back = verify_token(SECRET, &token, 5_000).unwrap();
        assert_eq!(back, claims());
    }

    #[test]
    fn test_verify_preserves_profile_fields() {
        let mut c = claims();
        c.uid = Some("prof-1".into());
        c.fc = Some("VLY-4821".into());
        c.un = Some("nova".into());
        let token = mint_token(SECRET, &c).unwrap();
        let back = verify_token(SECRET, &token, 5_000).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_verify_rejects_tampered_signature() {
        let token = mint_token(SECRET, &claims()).unwrap();
        let (payload, _sig) = token.split_once('.').unwrap();
        let forged = format!("{payload}.{}", URL_SAFE_NO_PAD.encode(b"nope"));
        assert!(matches!(
            verify_token(SECRET, &forged, 5_000),
            Err(SessionError::TokenSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let token = mint_token(SECRET, &claims()).unwrap();
        let (_payload, sig) = token.split_once('.').unwrap();
        let mut other = claims();
        other.pid = "attacker-9999".into();
        let other_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&other).unwrap());
        let forged = format!("{other_payload}.{sig}");
        assert!(matches!(
            verify_token(SECRET, &forged, 5_000),
            Err(SessionError::TokenSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = mint_token(SECRET, &claims()).unwrap();
        assert!(matches!(
            verify_token(b"other-secret", &token, 5_000),
            Err(SessionError::TokenSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_expired() {
        let token = mint_token(SECRET, &claims()).unwrap();
        assert!(matches!(
            verify_token(SECRET, &token, 10_000),
            Err(SessionError::TokenExpired)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        for bad in ["", "abc", "a.b.c", "!!!.???"] {
            assert!(matches!(
                verify_token(SECRET, bad, 0),
                Err(SessionError::TokenMalformed)
            ));
        }
    }
}
