//! Transport layer: framing, CRC, and the half-duplex line discipline.
//!
//! - **Framing**: byte-stuffing codec and incremental decoder
//!   ([`encode_frame`], [`FrameDecoder`])
//! - **CRC**: optional CRC-16/ARC early-reject gate ([`crc16`])
//! - **Line**: direction control and timed turnaround ([`transmit`],
//!   [`TurnaroundTiming`], [`AutoDirection`])
//!
//! The transport layer moves opaque logical packets; it knows nothing
//! about headers, keys, or MACs.

mod crc;
mod framing;
mod line;

pub use crc::{crc16, verify_crc16};
pub use framing::{encode_frame, is_reserved, FrameDecoder};
pub use line::{transmit, AutoDirection, TurnaroundTiming};
