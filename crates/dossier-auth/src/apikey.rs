//! API key derivation.
//!
//! Keys are derived with HMAC-SHA256 over the key content and the user's
//! salt, keyed with a deployment-wide secret, then base64url-encoded under a
//! scheme prefix so the derivation can be rotated later.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use dossier_core::error::{DossierError, Result};

/// Prefix identifying the current derivation scheme.
const SCHEME_PREFIX: &str = "#01#";

/// Content and per-user salt feeding the derivation.
pub struct ContentToHash {
    pub content: String,
    pub salt: Uuid,
}

/// Derive an API key from content and salt.
pub fn derive_key(hmac_key: &[u8], to_hash: &ContentToHash) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|_| DossierError::Config("HMAC key rejected".to_string()))?;
    mac.update(to_hash.content.as_bytes());
    mac.update(to_hash.salt.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(format!("{}{}", SCHEME_PREFIX, b64u_encode(&digest)))
}

/// Generate a fresh salt plus derived key for a new user. The key is bound to
/// the user's email through the derivation, so the same email re-keys to a
/// different value only because the salt is regenerated.
pub fn generate_key(hmac_key: &[u8], email: &str) -> Result<(Uuid, String)> {
    let salt = Uuid::new_v4();
    let key = derive_key(
        hmac_key,
        &ContentToHash {
            content: email.to_string(),
            salt,
        },
    )?;
    Ok((salt, key))
}

fn b64u_encode(content: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(content)
}
