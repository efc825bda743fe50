//! Logical packet codec: header layout, MAC pipeline, payload cipher.
//!
//! Wire layout of a logical packet (before framing):
//!
//! ```text
//! +--------+--------+----------+----------------+----------+
//! | Source | Target | MsgType  | Key ID (BE16)  | IV       |
//! | 1 byte | 1 byte | 1 byte   | 2 bytes        | 16 bytes |
//! +--------+--------+----------+----------------+----------+
//! | Ciphertext (16*K bytes, K >= 1)                        |
//! +--------------------------------------------------------+
//! | CRC-16 (2 bytes, optional)                             |
//! +--------------------------------------------------------+
//! | HMAC-SHA-256 tag (32 bytes)                            |
//! +--------------------------------------------------------+
//! ```
//!
//! The tag covers everything before it and is keyed with the master
//! key. Receive order is fixed: length gate, CRC gate (when enabled),
//! MAC verify, address filter, key lookup, decrypt, unpad. The MAC is
//! always verified before the address filter so a tampered target byte
//! cannot reach the cheap drop path, and always before any decryption.

use tracing::warn;

use crate::core::{
    BusError, PacketError, AES_BLOCK_SIZE, BROADCAST_ADDRESS, CRC_SIZE, HEADER_SIZE, IV_SIZE,
    MASTER_KEY_SIZE, MAX_RAW_PAYLOAD, TAG_SIZE,
};
use crate::crypto::{self, KeyLookup, KeyPool, SessionKey};
use crate::transport::{crc16, verify_crc16};

/// Message type tokens carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Application data.
    Data = b'D',
    /// Positive acknowledgement (payload `ACK`).
    Ack = b'A',
    /// Negative acknowledgement (payload `NACK:<reason>`).
    Nack = b'N',
    /// Master heartbeat.
    Heartbeat = b'H',
    /// Baud-rate change announcement (payload: ASCII integer).
    BaudRateSet = b'B',
    /// Session-key install (payload: key id, 16-byte key).
    KeyUpdate = b'K',
}

impl MsgType {
    /// Parse a message type from its header byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'D' => Some(Self::Data),
            b'A' => Some(Self::Ack),
            b'N' => Some(Self::Nack),
            b'H' => Some(Self::Heartbeat),
            b'B' => Some(Self::BaudRateSet),
            b'K' => Some(Self::KeyUpdate),
            _ => None,
        }
    }

    /// The header byte for this message type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// True for ACK and NACK, which are never themselves acknowledged.
    pub fn is_ack_kind(self) -> bool {
        matches!(self, Self::Ack | Self::Nack)
    }
}

/// Logical packet header, including the per-packet IV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sender node address.
    pub source: u8,
    /// Receiver node address; [`BROADCAST_ADDRESS`] reaches every node.
    pub target: u8,
    /// Message type token.
    pub msg_type: MsgType,
    /// Identifier of the session key the payload was encrypted under.
    pub key_id: u16,
    /// Random per-packet IV.
    pub iv: [u8; IV_SIZE],
}

impl Header {
    /// Serialize to the fixed wire layout.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.source;
        buf[1] = self.target;
        buf[2] = self.msg_type.as_byte();
        buf[3..5].copy_from_slice(&self.key_id.to_be_bytes());
        buf[5..HEADER_SIZE].copy_from_slice(&self.iv);
        buf
    }

    /// Parse the fixed wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let msg_type =
            MsgType::from_byte(bytes[2]).ok_or(PacketError::UnknownMsgType(bytes[2]))?;
        let key_id = u16::from_be_bytes([bytes[3], bytes[4]]);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[5..HEADER_SIZE]);

        Ok(Self {
            source: bytes[0],
            target: bytes[1],
            msg_type,
            key_id,
            iv,
        })
    }

    /// True when addressed to every node.
    pub fn is_broadcast(&self) -> bool {
        self.target == BROADCAST_ADDRESS
    }
}

/// A received packet after the full verify/decrypt pipeline.
#[derive(Debug, PartialEq, Eq)]
pub enum Opened {
    /// MAC verified and payload decrypted.
    Plaintext {
        /// The authenticated header.
        header: Header,
        /// The decrypted, unpadded application payload.
        payload: Vec<u8>,
    },
    /// MAC verified, but the key id matches no usable pool slot; the
    /// payload stays opaque.
    KeyMismatch {
        /// The authenticated header.
        header: Header,
    },
}

/// Build a sealed logical packet: pad, encrypt, MAC.
pub fn seal_packet(
    header: &Header,
    session_key: &SessionKey,
    master_key: &[u8; MASTER_KEY_SIZE],
    payload: &[u8],
    crc_enabled: bool,
) -> Result<Vec<u8>, BusError> {
    if payload.len() > MAX_RAW_PAYLOAD {
        return Err(BusError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_RAW_PAYLOAD,
        });
    }

    let ciphertext = crypto::seal(session_key, &header.iv, payload);

    let mut packet =
        Vec::with_capacity(HEADER_SIZE + ciphertext.len() + CRC_SIZE + TAG_SIZE);
    packet.extend_from_slice(&header.to_bytes());
    packet.extend_from_slice(&ciphertext);
    if crc_enabled {
        packet.extend_from_slice(&crc16(&packet).to_be_bytes());
    }
    let tag = crypto::compute_tag(master_key, &packet);
    packet.extend_from_slice(&tag);

    Ok(packet)
}

/// Verify and decrypt a received logical packet.
///
/// Returns `Ok(None)` for a MAC-valid packet addressed to another node
/// (dropped silently per the protocol). All other outcomes either
/// carry an [`Opened`] or a typed fault.
pub fn open_packet(
    packet: &[u8],
    master_key: &[u8; MASTER_KEY_SIZE],
    local_address: u8,
    pool: &KeyPool,
    crc_enabled: bool,
) -> Result<Option<Opened>, PacketError> {
    let trailer = TAG_SIZE + if crc_enabled { CRC_SIZE } else { 0 };
    let min_len = HEADER_SIZE + AES_BLOCK_SIZE + trailer;
    if packet.len() < min_len {
        return Err(PacketError::TooShort {
            expected: min_len,
            actual: packet.len(),
        });
    }

    let tag_start = packet.len() - TAG_SIZE;
    let data_end = tag_start - if crc_enabled { CRC_SIZE } else { 0 };

    if crc_enabled {
        let expected = u16::from_be_bytes([packet[data_end], packet[data_end + 1]]);
        if !verify_crc16(&packet[..data_end], expected) {
            return Err(PacketError::CrcMismatch);
        }
    }

    if !crypto::verify_tag(master_key, &packet[..tag_start], &packet[tag_start..]) {
        return Err(PacketError::MacMismatch);
    }

    let header = Header::from_bytes(&packet[..HEADER_SIZE])?;

    if header.target != local_address && !header.is_broadcast() {
        return Ok(None);
    }

    let ciphertext = &packet[HEADER_SIZE..data_end];
    let key = match pool.lookup(header.key_id) {
        KeyLookup::Active(key) => key,
        KeyLookup::Stale(key) => {
            warn!(
                key_id = header.key_id,
                active = pool.current_key_id(),
                "decrypting with a non-active session key"
            );
            key
        }
        KeyLookup::Unknown => return Ok(Some(Opened::KeyMismatch { header })),
    };

    let payload = crypto::open(key, &header.iv, ciphertext)?;
    Ok(Some(Opened::Plaintext { header, payload }))
}
