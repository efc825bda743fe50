//! Error types for the secure bus stack.

use thiserror::Error;

/// Errors in the cipher and key-pool layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key id does not index the pool.
    #[error("key id {id} outside pool capacity {capacity}")]
    KeyIdOutOfRange {
        /// Offending key id.
        id: u16,
        /// Pool capacity.
        capacity: u16,
    },

    /// Key slot exists but has never been installed.
    #[error("key slot {0} has never been installed")]
    KeySlotUninitialized(u16),

    /// The active key slot cannot be retired.
    #[error("cannot retire the active key slot {0}")]
    RetireActiveKey(u16),

    /// PKCS#7 padding check failed after decryption.
    #[error("invalid padding")]
    BadPadding,

    /// Ciphertext is empty or not block-aligned.
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    MisalignedCiphertext(usize),
}

/// Errors in the packet codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Logical packet shorter than the minimum layout.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Authentication tag did not verify.
    #[error("authentication tag mismatch")]
    MacMismatch,

    /// Early-reject CRC gate failed (only when CRC is enabled).
    #[error("CRC-16 mismatch")]
    CrcMismatch,

    /// Message type byte is not one of the defined tokens.
    #[error("unknown message type byte 0x{0:02x}")]
    UnknownMsgType(u8),

    /// Cipher or key-pool fault.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Top-level errors surfaced by host-facing stack operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Application payload exceeds the per-packet limit.
    #[error("payload length {len} exceeds the {max}-byte limit")]
    PayloadTooLarge {
        /// Offered payload length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// Writing or flushing the serial port failed.
    #[error("serial write failed: {0}")]
    SerialWriteFailed(#[source] std::io::Error),

    /// Reading the serial port failed.
    #[error("serial read failed: {0}")]
    SerialReadFailed(#[source] std::io::Error),

    /// Changing the port baud rate failed.
    #[error("baud rate change failed: {0}")]
    BaudRateFailed(#[source] std::io::Error),

    /// Frame exceeded the worst-case unstuffed size.
    #[error("receive buffer overflow")]
    BufferOverflow,

    /// No acknowledgement arrived within the wait window.
    #[error("no acknowledgement within the wait window")]
    AckTimeout,

    /// Peer answered with a negative acknowledgement.
    #[error("peer rejected the message: {0}")]
    NackReceived(String),

    /// An acknowledgement was requested for a broadcast target.
    #[error("acknowledgement requested for a broadcast")]
    AckOnBroadcast,

    /// Packet codec fault.
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// Cipher or key-pool fault.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors from the key rotation manager.
#[derive(Debug, Error)]
pub enum RotationError {
    /// `poll` re-entered while a rotation was already running.
    #[error("rotation already in progress")]
    InProgress,

    /// The distribution callback failed; the previous key stays active.
    #[error("key distribution failed: {0}")]
    RotationFailed(#[source] BusError),
}
