//! Symmetric-signed, JWT-shaped session tokens. Hand-rolled HS256 rather
//! than a full JWT crate: the payload shape is fixed and tiny, and no repo
//! in the grounding pack already depends on a JWT library to imitate.

use crate::error::{ApiError, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const ALG: &str = "HS256";

pub struct TokenCodec {
    secret: Vec<u8>,
    issuer: String,
    audience: String,
    ttl_seconds: i64,
}

impl TokenCodec {
    pub fn new(secret: Vec<u8>, issuer: impl Into<String>, audience: impl Into<String>, ttl_seconds: i64) -> Self {
        Self { secret, issuer: issuer.into(), audience: audience.into(), ttl_seconds }
    }

    pub fn sign(&self, sid: &str, now_unix: i64) -> Result<String> {
        let claims = TokenClaims {
            sid: sid.to_string(),
            iat: now_unix,
            exp: now_unix + self.ttl_seconds,
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
        };
        self.sign_claims(&claims)
    }

    fn sign_claims(&self, claims: &TokenClaims) -> Result<String> {
        let header = Header { alg: ALG, typ: "JWT" };
        let header_b64 = b64(&serde_json::to_vec(&header)?);
        let claims_b64 = b64(&serde_json::to_vec(claims)?);
        let signing_input = format!("{header_b64}.{claims_b64}");
        let sig = self.sign_bytes(signing_input.as_bytes());
        Ok(format!("{signing_input}.{}", b64(&sig)))
    }

    fn sign_bytes(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verifies signature and `exp`; returns claims on success.
    pub fn verify(&self, token: &str, now_unix: i64) -> Result<TokenClaims> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, sig_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(c), Some(s), None) => (h, c, s),
            _ => return Err(ApiError::InvalidToken),
        };
        let signing_input = format!("{header_b64}.{claims_b64}");
        let given_sig = unb64(sig_b64).map_err(|_| ApiError::InvalidToken)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&given_sig).map_err(|_| ApiError::InvalidToken)?;

        let claims_bytes = unb64(claims_b64).map_err(|_| ApiError::InvalidToken)?;
        let claims: TokenClaims =
            serde_json::from_slice(&claims_bytes).map_err(|_| ApiError::InvalidToken)?;

        if claims.exp <= now_unix {
            return Err(ApiError::InvalidToken);
        }
        Ok(claims)
    }
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn unb64(s: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)
}

/// Generates a process-lifetime random secret for single-user mode when no
/// `SESSION_SECRET` is configured. State signed with it is valid only until
/// restart.
pub fn random_secret() -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}
