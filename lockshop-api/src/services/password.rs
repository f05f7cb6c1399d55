//! Salted SHA-256 password digests.
//!
//! Stored form: `sha256$<salt hex>$<digest hex>`, digest over salt then
//! password bytes.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::constants::PASSWORD_SALT_BYTES;

const SCHEME: &str = "sha256";

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash a password under a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; PASSWORD_SALT_BYTES];
    rand::rng().fill_bytes(&mut salt);
    format!(
        "{}${}${}",
        SCHEME,
        hex::encode(salt),
        hex::encode(digest(&salt, password))
    )
}

/// Check a password against a stored hash in constant time.
///
/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(scheme), Some(salt_hex), Some(digest_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    bool::from(digest(&salt, password).ct_eq(&expected))
}
