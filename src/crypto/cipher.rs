//! AES-128-CBC payload encryption with explicit PKCS#7 padding.
//!
//! Padding is applied and checked here rather than delegated to the
//! cipher crate: the unpad check must run in constant time, and its
//! failure is a distinct integrity signal ([`CryptoError::BadPadding`]).

use aes::Aes128;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroize;

use crate::core::{CryptoError, AES_BLOCK_SIZE, AES_KEY_SIZE, IV_SIZE};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// A session key for payload encryption.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; AES_KEY_SIZE],
}

impl SessionKey {
    /// Create a session key from raw bytes.
    pub fn from_bytes(key: [u8; AES_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Append PKCS#7 padding up to the next block boundary.
///
/// An input already on a block boundary (including the empty input)
/// gains a full block of padding, so the result length is always a
/// positive multiple of [`AES_BLOCK_SIZE`].
pub fn pkcs7_pad(payload: &[u8]) -> Vec<u8> {
    let pad = AES_BLOCK_SIZE - payload.len() % AES_BLOCK_SIZE;
    let mut out = Vec::with_capacity(payload.len() + pad);
    out.extend_from_slice(payload);
    out.resize(payload.len() + pad, pad as u8);
    out
}

/// Validate PKCS#7 padding and return the unpadded length.
///
/// The check is constant-time over the final block: the padding byte
/// and every byte it claims to cover are compared without early exit,
/// so a padding oracle cannot distinguish where the check failed.
pub fn pkcs7_unpadded_len(buf: &[u8]) -> Result<usize, CryptoError> {
    if buf.is_empty() || buf.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::MisalignedCiphertext(buf.len()));
    }

    let pad = buf[buf.len() - 1];
    let mut valid = Choice::from(u8::from(pad >= 1)) & Choice::from(u8::from(pad <= AES_BLOCK_SIZE as u8));
    for i in 0..AES_BLOCK_SIZE {
        let byte = buf[buf.len() - 1 - i];
        let in_pad = Choice::from(u8::from((i as u8) < pad));
        valid &= !in_pad | byte.ct_eq(&pad);
    }

    if valid.unwrap_u8() == 0 {
        return Err(CryptoError::BadPadding);
    }
    Ok(buf.len() - pad as usize)
}

/// Pad and encrypt an application payload.
///
/// The returned ciphertext length is `payload.len()` rounded up to the
/// next block boundary (one full extra block when already aligned).
pub fn seal(key: &SessionKey, iv: &[u8; IV_SIZE], payload: &[u8]) -> Vec<u8> {
    let mut padded = pkcs7_pad(payload);
    let ciphertext = Aes128CbcEnc::new(key.as_bytes().into(), iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(&padded);
    padded.zeroize();
    ciphertext
}

/// Decrypt a ciphertext and strip its padding.
///
/// Rejects empty or misaligned ciphertexts before touching the cipher.
pub fn open(
    key: &SessionKey,
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::MisalignedCiphertext(ciphertext.len()));
    }

    let mut padded = Aes128CbcDec::new(key.as_bytes().into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::MisalignedCiphertext(ciphertext.len()))?;

    let len = match pkcs7_unpadded_len(&padded) {
        Ok(len) => len,
        Err(e) => {
            padded.zeroize();
            return Err(e);
        }
    };

    let plaintext = padded[..len].to_vec();
    padded.zeroize();
    Ok(plaintext)
}
