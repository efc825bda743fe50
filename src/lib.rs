//! # securebus
//!
//! A secure, framed, datagram-style link-layer stack for half-duplex
//! multi-drop serial buses of the RS-485 family. It provides
//! authenticated, confidentiality-protected, addressable messages
//! between a bus master and a set of slave nodes, with an optional
//! acknowledgement sublayer and in-band session-key rotation.
//!
//! - **Integrity**: HMAC-SHA-256 over every packet, keyed with a
//!   pre-shared 32-byte master key; verification always precedes
//!   decryption
//! - **Confidentiality**: AES-128-CBC under rotating session keys with
//!   a fresh random IV per packet
//! - **Framing**: byte-stuffed, self-delimiting frames that
//!   resynchronize after any line fault
//! - **Half-duplex discipline**: direction control with timed
//!   turnaround around every transmission
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------+
//! |            Host application             |
//! +-----------------------------------------+
//! |        SecureStack  (stack)             |   send / receive / ACK
//! +-----------------------------------------+
//! |   Packet codec  (packet, crypto)        |   pad, encrypt, MAC
//! +-----------------------------------------+
//! |   Framing + line  (transport)           |   stuff, delimit, turnaround
//! +-----------------------------------------+
//! |   UART + transceiver  (host-provided)   |
//! +-----------------------------------------+
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use securebus::prelude::*;
//!
//! # struct MyUart;
//! # impl SerialPort for MyUart {
//! #     fn set_baud_rate(&mut self, _: u32) -> std::io::Result<()> { Ok(()) }
//! #     fn write_all(&mut self, _: &[u8]) -> std::io::Result<()> { Ok(()) }
//! #     fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
//! #     fn read_byte(&mut self) -> std::io::Result<Option<u8>> { Ok(None) }
//! # }
//! # fn main() -> Result<(), BusError> {
//! let master_key = [0x32u8; 32];
//! let mut stack = SecureStack::new(MyUart, 1, master_key);
//! stack.begin(115_200)?;
//! stack.register_receive_callback(|msg| {
//!     if let Body::Plaintext(payload) = msg.body {
//!         println!("{} -> {:?}: {:?}", msg.source, msg.msg_type, payload);
//!     }
//! });
//!
//! stack.send_message(2, MsgType::Data, b"hello", true)?;
//! loop {
//!     stack.process_incoming()?;
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency model
//!
//! Single-threaded cooperative: one logical task owns the stack and
//! calls `process_incoming`, `send_message`, and the rotation
//! manager's `poll` sequentially. Hosts with threads must funnel all
//! access through one owning actor; the stack has no interior locks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod crypto;
pub mod packet;
pub mod rotation;
pub mod stack;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        BusError, CryptoError, DirectionControl, PacketError, RotationError, SerialPort,
    };
    pub use crate::packet::{Header, MsgType};
    pub use crate::rotation::{KeyRotationManager, RotationPolicy};
    pub use crate::stack::{Body, Received, SecureStack, StackConfig, StackStats};
    pub use crate::transport::{AutoDirection, TurnaroundTiming};
}

// Re-export commonly used items at crate root.
pub use crate::core::{BusError, DirectionControl, SerialPort};
pub use crate::packet::MsgType;
pub use crate::rotation::KeyRotationManager;
pub use crate::stack::{Body, Received, SecureStack};
