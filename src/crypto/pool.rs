//! Fixed-capacity session-key pool with an active-key selector.
//!
//! Slot 0 is populated at construction with the KDF-derived boot key
//! and starts active, so a freshly booted node can exchange traffic
//! immediately. Every other slot must be installed before it can be
//! activated; the pool tracks an initialized bit per slot.

use super::cipher::SessionKey;
use super::kdf::derive_boot_key;
use crate::core::{CryptoError, AES_KEY_SIZE, MASTER_KEY_SIZE, SESSION_KEY_POOL_SIZE};

/// Outcome of looking up the key id carried by a received packet.
pub enum KeyLookup<'a> {
    /// The id matches the active slot.
    Active(&'a SessionKey),
    /// The id indexes an initialized slot that is not active
    /// (tolerated mid-rotation; callers must log the use).
    Stale(&'a SessionKey),
    /// The id is out of range or the slot was never installed.
    Unknown,
}

/// The session-key table.
pub struct KeyPool {
    slots: [SessionKey; SESSION_KEY_POOL_SIZE],
    initialized: [bool; SESSION_KEY_POOL_SIZE],
    active: u16,
}

impl KeyPool {
    /// Build a pool with slot 0 derived from the master key and active.
    pub fn new(master_key: &[u8; MASTER_KEY_SIZE]) -> Self {
        let mut slots = std::array::from_fn(|_| SessionKey::from_bytes([0u8; AES_KEY_SIZE]));
        let mut initialized = [false; SESSION_KEY_POOL_SIZE];
        slots[0] = derive_boot_key(master_key);
        initialized[0] = true;
        Self {
            slots,
            initialized,
            active: 0,
        }
    }

    /// Pool capacity in slots.
    pub fn capacity(&self) -> u16 {
        SESSION_KEY_POOL_SIZE as u16
    }

    /// Copy a key into a slot and mark it initialized.
    pub fn install_key(&mut self, id: u16, key: &[u8; AES_KEY_SIZE]) -> Result<(), CryptoError> {
        let slot = self.slot_index(id)?;
        self.slots[slot] = SessionKey::from_bytes(*key);
        self.initialized[slot] = true;
        Ok(())
    }

    /// Switch the active pointer to an initialized slot.
    pub fn activate_key(&mut self, id: u16) -> Result<(), CryptoError> {
        let slot = self.slot_index(id)?;
        if !self.initialized[slot] {
            return Err(CryptoError::KeySlotUninitialized(id));
        }
        self.active = id;
        Ok(())
    }

    /// Deinitialize a non-active slot so its id stops decrypting.
    ///
    /// Used after a rotation has settled to invalidate the previous
    /// epoch; replays under the retired id then surface as key
    /// mismatches rather than silently decrypting.
    pub fn retire_key(&mut self, id: u16) -> Result<(), CryptoError> {
        let slot = self.slot_index(id)?;
        if id == self.active {
            return Err(CryptoError::RetireActiveKey(id));
        }
        self.slots[slot] = SessionKey::from_bytes([0u8; AES_KEY_SIZE]);
        self.initialized[slot] = false;
        Ok(())
    }

    /// Identifier of the active slot.
    pub fn current_key_id(&self) -> u16 {
        self.active
    }

    /// The active session key.
    pub fn active_key(&self) -> &SessionKey {
        // The active id always indexes an initialized slot: slot 0 is
        // initialized at construction and activate_key refuses others.
        &self.slots[self.active as usize]
    }

    /// Classify the key id of a received packet.
    pub fn lookup(&self, id: u16) -> KeyLookup<'_> {
        let Ok(slot) = self.slot_index(id) else {
            return KeyLookup::Unknown;
        };
        if !self.initialized[slot] {
            return KeyLookup::Unknown;
        }
        if id == self.active {
            KeyLookup::Active(&self.slots[slot])
        } else {
            KeyLookup::Stale(&self.slots[slot])
        }
    }

    fn slot_index(&self, id: u16) -> Result<usize, CryptoError> {
        if id as usize >= SESSION_KEY_POOL_SIZE {
            return Err(CryptoError::KeyIdOutOfRange {
                id,
                capacity: self.capacity(),
            });
        }
        Ok(id as usize)
    }
}
