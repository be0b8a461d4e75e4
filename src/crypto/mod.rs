pub mod password;
pub mod token;

pub use password::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Malformed password hash")]
    MalformedHash,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Signing secret must be at least {0} bytes")]
    WeakSecret(usize),

    #[error("Token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
