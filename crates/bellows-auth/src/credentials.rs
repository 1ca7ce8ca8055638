//! Credential material: token generation and SSH key fingerprints.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Token prefix, so leaked values are recognizable in scanners.
const TOKEN_PREFIX: &str = "blw_";

/// Generate a personal access token.
///
/// Returns `(raw, hash)`: the raw value is shown to the user exactly once;
/// only the hash is ever stored. Tokens are 32 random bytes, which is why a
/// single unsalted SHA-256 is sufficient here. It must never be used for
/// user passwords.
pub fn generate_token() -> (String, String) {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    let raw = format!("{TOKEN_PREFIX}{}", hex::encode(secret));
    let hash = hash_token(&raw);
    (raw, hash)
}

/// Hash a raw token value the way the store persists it.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Fingerprint of an SSH public key's wire encoding: `SHA256:` + hex.
pub fn fingerprint_blob(blob: &[u8]) -> String {
    format!("SHA256:{}", hex::encode(Sha256::digest(blob)))
}

/// Fingerprint of an authorized-keys line.
///
/// The line is `<type> <base64-blob> [comment]`; the fingerprint covers the
/// decoded blob. Returns `None` when the line does not parse.
pub fn fingerprint_public_key(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let key_type = parts.next()?;
    let blob_b64 = parts.next()?;
    if !matches!(
        key_type,
        "ssh-ed25519"
            | "ssh-rsa"
            | "ecdsa-sha2-nistp256"
            | "ecdsa-sha2-nistp384"
            | "ecdsa-sha2-nistp521"
    ) {
        return None;
    }
    let blob = base64::engine::general_purpose::STANDARD
        .decode(blob_b64)
        .ok()?;
    // The blob embeds its own type string; a mismatch means a forged line.
    if blob.len() < 4 {
        return None;
    }
    let type_len = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    if blob.len() < 4 + type_len || &blob[4..4 + type_len] != key_type.as_bytes() {
        return None;
    }
    Some(fingerprint_blob(&blob))
}
