//! Cryptographic layer: payload cipher, packet MAC, KDF, key pool.
//!
//! - **Cipher**: AES-128-CBC with explicit PKCS#7 padding ([`seal`], [`open`])
//! - **MAC**: HMAC-SHA-256 keyed with the master key ([`compute_tag`], [`verify_tag`])
//! - **KDF**: boot-key derivation and OS-RNG material ([`derive_boot_key`], [`random_iv`])
//! - **Key pool**: fixed-capacity session-key table ([`KeyPool`])
//!
//! All engine state is per-stack; there are no process-wide crypto
//! instances.

mod cipher;
mod kdf;
mod mac;
mod pool;

pub use cipher::{open, pkcs7_pad, pkcs7_unpadded_len, seal, SessionKey};
pub use kdf::{derive_boot_key, random_iv, random_key};
pub use mac::{compute_tag, verify_tag};
pub use pool::{KeyLookup, KeyPool};
