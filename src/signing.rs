use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Compute the base64-encoded HMAC-SHA256 digest the commerce platform
/// sends in `X-Shopify-Hmac-Sha256`.
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(b"default").expect("hmac"));
    mac.update(payload);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verify a received signature against the exact raw body bytes.
///
/// The digest must be computed over the bytes as received, never over a
/// re-serialized parse: any whitespace or key-ordering difference changes
/// the digest. Comparison is constant-time via `Mac::verify_slice`.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature_b64: &str) -> bool {
    let Ok(signature) = BASE64.decode(signature_b64) else {
        return false;
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(b"default").expect("hmac"));
    mac.update(payload);

    mac.verify_slice(&signature).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    MissingSignature,
    InvalidSignature,
}

/// Verify an incoming webhook request in one call.
///
/// Fails closed: a missing header is rejected the same way a forged one
/// is, and the caller must not parse the body until this returns `Ok`.
pub fn verify_webhook_request(
    signature_header: Option<&str>,
    payload: &[u8],
    secret: &[u8],
) -> Result<(), SignatureError> {
    let signature = signature_header.ok_or(SignatureError::MissingSignature)?;

    if verify_signature(secret, payload, signature) {
        Ok(())
    } else {
        Err(SignatureError::InvalidSignature)
    }
}
