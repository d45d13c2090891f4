//! Billing webhook signature verification.
//!
//! The provider signs the raw request body with HMAC-SHA256 and sends the hex
//! digest in `X-Signature`, optionally prefixed with `sha256=`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::WebhookError;

/// Length of a hex-encoded SHA-256 digest.
const SIGNATURE_HEX_LEN: usize = 64;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifier for billing webhook signatures.
pub struct WebhookVerifier {
    secret: Option<SecretString>,
}

impl WebhookVerifier {
    /// Creates a verifier. A `None` or empty secret makes every call fail with
    /// `SecretNotConfigured`.
    pub fn new(secret: Option<SecretString>) -> Self {
        let secret = secret.filter(|s| !s.expose_secret().is_empty());
        Self { secret }
    }

    /// Returns true when a signing secret is present.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verifies `signature_header` against the exact `payload` bytes.
    ///
    /// # Errors
    ///
    /// - `SecretNotConfigured` - no secret
    /// - `MissingSignature` - header absent or blank
    /// - `InvalidSignatureFormat` - not 64 hex characters
    /// - `InvalidSignature` - digest mismatch
    pub fn verify(&self, payload: &[u8], signature_header: Option<&str>) -> Result<(), WebhookError> {
        let secret = self.secret.as_ref().ok_or(WebhookError::SecretNotConfigured)?;

        let header = signature_header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(WebhookError::MissingSignature)?;

        let claimed = decode_signature(header)?;

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::SecretNotConfigured)?;
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        if bool::from(expected.as_slice().ct_eq(&claimed)) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// Strips the optional prefix and decodes exactly 32 bytes of hex.
fn decode_signature(header: &str) -> Result<[u8; 32], WebhookError> {
    let hex_part = header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header);

    if hex_part.len() != SIGNATURE_HEX_LEN {
        return Err(WebhookError::InvalidSignatureFormat(format!(
            "expected {} hex characters, got {}",
            SIGNATURE_HEX_LEN,
            hex_part.len()
        )));
    }

    let mut digest = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut digest)
        .map_err(|e| WebhookError::InvalidSignatureFormat(e.to_string()))?;
    Ok(digest)
}

/// Computes the hex signature for use in test fixtures.
#[cfg(test)]
pub fn compute_test_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
