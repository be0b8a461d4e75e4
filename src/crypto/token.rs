//! HS256 bearer tokens (compact JWT) carrying the user id and role.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use super::CryptoError;
use crate::models::enums::Role;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: chrono::Duration) -> Result<Self, CryptoError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(CryptoError::WeakSecret(MIN_SECRET_LENGTH));
        }
        Ok(Self {
            secret: secret.to_vec(),
            ttl_secs: ttl.num_seconds(),
        })
    }

    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<String, CryptoError> {
        self.issue_at(user_id, role, chrono::Utc::now().timestamp())
    }

    pub fn issue_at(&self, user_id: Uuid, role: Role, now: i64) -> Result<String, CryptoError> {
        let header = Header {
            alg: "HS256".into(),
            typ: "JWT".into(),
        };
        let claims = Claims {
            sub: user_id,
            role,
            iat: now,
            exp: now + self.ttl_secs,
        };

        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&message)?.finalize().into_bytes());
        Ok(format!("{message}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, CryptoError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Check signature first, then expiry. A token is valid strictly before `exp`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, CryptoError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::MalformedToken);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CryptoError::MalformedToken)?;
        self.mac(&format!("{header}.{payload}"))?
            .verify_slice(&signature)
            .map_err(|_| CryptoError::BadSignature)?;

        let header: Header = decode_segment(header)?;
        if header.alg != "HS256" {
            return Err(CryptoError::MalformedToken);
        }
        let claims: Claims = decode_segment(payload)?;
        if now >= claims.exp {
            return Err(CryptoError::TokenExpired);
        }
        Ok(claims)
    }

    fn mac(&self, message: &str) -> Result<HmacSha256, CryptoError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| CryptoError::WeakSecret(MIN_SECRET_LENGTH))?;
        mac.update(message.as_bytes());
        Ok(mac)
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, CryptoError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| CryptoError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| CryptoError::MalformedToken)
}
