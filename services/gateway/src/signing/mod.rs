//! HMAC-SHA256 signatures over forwarded context headers.

mod error;
mod signer;

pub use error::SigningError;
pub use signer::ContextSigner;

/// Minimum signing key length in bytes.
pub const MIN_KEY_BYTES: usize = 32;
