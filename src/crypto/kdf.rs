//! Key derivation and random material.
//!
//! The only derivation in the protocol is the boot key: every node
//! computes `truncate16(SHA-256(master_key))` for slot 0 of its pool,
//! so all nodes share an initial session key without any on-wire
//! exchange. Fresh IVs and rotation keys come from the operating
//! system's cryptographic RNG; there is no pseudo-random fallback.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::cipher::SessionKey;
use crate::core::{AES_KEY_SIZE, IV_SIZE, MASTER_KEY_SIZE};

/// Derive the slot-0 session key from the master key.
pub fn derive_boot_key(master_key: &[u8; MASTER_KEY_SIZE]) -> SessionKey {
    let mut digest: [u8; 32] = Sha256::digest(master_key).into();
    let mut key = [0u8; AES_KEY_SIZE];
    key.copy_from_slice(&digest[..AES_KEY_SIZE]);
    digest.zeroize();
    SessionKey::from_bytes(key)
}

/// Draw a fresh per-packet IV.
pub fn random_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Draw a fresh session key for rotation.
pub fn random_key() -> [u8; AES_KEY_SIZE] {
    let mut key = [0u8; AES_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}
