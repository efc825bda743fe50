//! Packet authentication with HMAC-SHA-256.
//!
//! Tags are always keyed with the 32-byte master key, never a session
//! key: integrity is tied to the long-lived shared secret while
//! confidentiality uses the rotating session keys.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::core::{MASTER_KEY_SIZE, TAG_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Compute the full 32-byte tag over `data`.
pub fn compute_tag(master_key: &[u8; MASTER_KEY_SIZE], data: &[u8]) -> [u8; TAG_SIZE] {
    let mut mac = HmacSha256::new_from_slice(master_key)
        .expect("HMAC-SHA-256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verify a received tag in constant time.
pub fn verify_tag(master_key: &[u8; MASTER_KEY_SIZE], data: &[u8], tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(master_key)
        .expect("HMAC-SHA-256 accepts any key length");
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}
