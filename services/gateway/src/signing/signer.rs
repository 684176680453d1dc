use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use super::error::SigningError;
use super::MIN_KEY_BYTES;

type HmacSha256 = Hmac<Sha256>;

/// Signs the context headers forwarded on an allowed request so a downstream
/// service outside the trusted boundary can detect tampering.
#[derive(Clone)]
pub struct ContextSigner {
    key: Vec<u8>,
}

impl ContextSigner {
    /// Accepts a base64 key of at least 32 decoded bytes, otherwise uses the raw
    /// secret bytes.
    pub fn new(secret: &str) -> Result<Self, SigningError> {
        if secret.trim().is_empty() {
            return Err(SigningError::InvalidKey("secret cannot be empty".into()));
        }

        let decoded = STANDARD
            .decode(secret)
            .ok()
            .filter(|key| key.len() >= MIN_KEY_BYTES)
            .unwrap_or_else(|| secret.as_bytes().to_vec());
        if decoded.len() < MIN_KEY_BYTES {
            return Err(SigningError::InvalidKey(format!(
                "signing key must be at least {} bytes",
                MIN_KEY_BYTES
            )));
        }

        Ok(Self { key: decoded })
    }

    pub fn sign(&self, data: &[u8]) -> Result<String, SigningError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        mac.update(data);
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, data: &[u8], signature: &str) -> Result<bool, SigningError> {
        let decoded = STANDARD
            .decode(signature)
            .map_err(|err| SigningError::EncodingError(err.to_string()))?;
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        mac.update(data);

        Ok(mac.verify_slice(&decoded).is_ok())
    }

    /// Signs the canonical `name=value` lines of the given headers, in order.
    pub fn sign_headers(&self, headers: &[(&'static str, String)]) -> Result<String, SigningError> {
        let payload = canonical_payload(headers);
        let signature = self.sign(payload.as_bytes())?;
        debug!(headers = headers.len(), "signed context headers");
        Ok(signature)
    }

    pub fn verify_headers(
        &self,
        headers: &[(&'static str, String)],
        signature: &str,
    ) -> Result<bool, SigningError> {
        self.verify(canonical_payload(headers).as_bytes(), signature)
    }
}

fn canonical_payload(headers: &[(&'static str, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "context-signing-secret-for-tests!";

    #[test]
    fn short_keys_are_rejected() {
        assert!(matches!(
            ContextSigner::new("too-short"),
            Err(SigningError::InvalidKey(_))
        ));
        assert!(ContextSigner::new("   ").is_err());
    }

    #[test]
    fn signatures_verify_and_detect_tampering() {
        let signer = ContextSigner::new(SECRET).unwrap();
        let headers = vec![
            ("tenant-id", "t-1".to_string()),
            ("user-role", "teacher".to_string()),
        ];

        let signature = signer.sign_headers(&headers).unwrap();
        assert!(signer.verify_headers(&headers, &signature).unwrap());

        let tampered = vec![
            ("tenant-id", "t-1".to_string()),
            ("user-role", "schoolAdmin".to_string()),
        ];
        assert!(!signer.verify_headers(&tampered, &signature).unwrap());
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = ContextSigner::new(SECRET).unwrap();
        assert_eq!(signer.sign(b"payload").unwrap(), signer.sign(b"payload").unwrap());
        assert!(signer.verify(b"payload", "not base64!").is_err());
    }
}
