//! Protocol constants for the secure bus link layer.
//!
//! These values are fixed by the wire format and MUST NOT be changed;
//! two nodes disagreeing on any of them cannot interoperate.

use std::time::Duration;

// =============================================================================
// FRAMING
// =============================================================================

/// Frame delimiter: start of frame.
pub const START_BYTE: u8 = 0xAA;

/// Frame delimiter: end of frame.
pub const END_BYTE: u8 = 0x55;

/// Escape introducer for byte stuffing.
pub const ESCAPE_BYTE: u8 = 0xBB;

/// XOR mask applied to an escaped byte.
///
/// The three reserved values remain pairwise distinct after XOR with
/// this mask, so an escaped byte can never be mistaken for a delimiter.
pub const ESCAPE_MASK: u8 = 0x20;

// =============================================================================
// CRYPTOGRAPHIC SIZES
// =============================================================================

/// AES-128 key size.
pub const AES_KEY_SIZE: usize = 16;

/// AES block size; ciphertext lengths are multiples of this.
pub const AES_BLOCK_SIZE: usize = 16;

/// Per-packet initialization vector size (one AES block).
pub const IV_SIZE: usize = 16;

/// Pre-shared master authentication key size.
pub const MASTER_KEY_SIZE: usize = 32;

/// HMAC-SHA-256 tag size (full output, untruncated).
pub const TAG_SIZE: usize = 32;

// =============================================================================
// PACKET LAYOUT
// =============================================================================

/// Header size: source + target + msg_type + key_id (BE16) + IV.
pub const HEADER_SIZE: usize = 1 + 1 + 1 + 2 + IV_SIZE;

/// Optional CRC-16 field size.
pub const CRC_SIZE: usize = 2;

/// Target address that every node delivers.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Maximum application payload accepted by the send path.
pub const MAX_RAW_PAYLOAD: usize = 200;

/// Largest possible ciphertext: `MAX_RAW_PAYLOAD` padded up one block.
pub const MAX_CIPHERTEXT: usize = (MAX_RAW_PAYLOAD / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE;

/// Largest logical packet (header + ciphertext + CRC + tag).
pub const MAX_LOGICAL_SIZE: usize = HEADER_SIZE + MAX_CIPHERTEXT + CRC_SIZE + TAG_SIZE;

/// Smallest valid logical packet: header, one ciphertext block, tag.
pub const MIN_LOGICAL_SIZE: usize = HEADER_SIZE + AES_BLOCK_SIZE + TAG_SIZE;

/// Worst-case framed size: every byte escaped, plus the two delimiters.
pub const MAX_FRAME_SIZE: usize = MAX_LOGICAL_SIZE * 2 + 2;

// =============================================================================
// KEY POOL
// =============================================================================

/// Number of session-key slots in the pool.
pub const SESSION_KEY_POOL_SIZE: usize = 5;

// =============================================================================
// TIMING
// =============================================================================

/// Delay between asserting transmit-enable and driving the line.
pub const T_ENABLE: Duration = Duration::from_micros(150);

/// Delay after the last byte is clocked out before releasing the line.
pub const T_DISABLE: Duration = Duration::from_micros(150);

/// How long a sender waits for an acknowledgement.
pub const T_ACK: Duration = Duration::from_millis(500);

/// Interval between serial polls while waiting for an acknowledgement.
pub const ACK_POLL_INTERVAL: Duration = Duration::from_millis(1);

// =============================================================================
// KEY ROTATION
// =============================================================================

/// Rotate the session key after this much wall-clock time.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Rotate the session key after this many sent messages.
pub const ROTATION_MESSAGE_THRESHOLD: u64 = 1000;
