//! Salted PBKDF2-SHA256 password hashes.
//!
//! Stored form: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`. The
//! iteration count travels with the hash, so raising the configured count
//! only affects new hashes.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::CryptoError;

pub const DEFAULT_ITERATIONS: u32 = 600_000;
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;
const SCHEME: &str = "pbkdf2-sha256";

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    /// Hash with a fresh random salt.
    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = derive(password, &salt, self.iterations);
        format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        )
    }

    /// Constant-time check of `password` against a stored hash.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, CryptoError> {
        let mut parts = stored.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(CryptoError::MalformedHash);
        };

        let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
        let salt = STANDARD_NO_PAD
            .decode(salt)
            .map_err(|_| CryptoError::MalformedHash)?;
        let expected = STANDARD_NO_PAD
            .decode(expected)
            .map_err(|_| CryptoError::MalformedHash)?;
        if iterations == 0 || expected.len() != HASH_LENGTH {
            return Err(CryptoError::MalformedHash);
        }

        let actual = derive(password, &salt, iterations);
        Ok(actual.ct_eq(expected.as_slice()).into())
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}
