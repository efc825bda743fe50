//! Byte-stuffing frame codec and the receive state machine.
//!
//! Wire form: `START | stuff(logical) | END`. Any occurrence of the
//! three reserved bytes inside the logical packet is replaced by
//! `ESCAPE, byte ^ ESCAPE_MASK`, so the delimiters stay unique on the
//! wire. Worst-case expansion is 2x plus the two delimiters.
//!
//! The decoder is deliberately forgiving: any framing fault (overflow,
//! stray bytes, truncated frame) drops the partial frame and
//! resynchronizes on the next `START`. Framing faults are counted and
//! logged, never surfaced.

use tracing::{trace, warn};

use crate::core::{END_BYTE, ESCAPE_BYTE, ESCAPE_MASK, MAX_LOGICAL_SIZE, START_BYTE};

/// True for the three byte values reserved by the framing layer.
pub const fn is_reserved(byte: u8) -> bool {
    matches!(byte, START_BYTE | END_BYTE | ESCAPE_BYTE)
}

/// Encode a logical packet into its framed wire form.
pub fn encode_frame(logical: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(logical.len() * 2 + 2);
    out.push(START_BYTE);
    for &byte in logical {
        if is_reserved(byte) {
            out.push(ESCAPE_BYTE);
            out.push(byte ^ ESCAPE_MASK);
        } else {
            out.push(byte);
        }
    }
    out.push(END_BYTE);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    InFrame,
    Escaped,
}

/// Incremental frame decoder fed one byte at a time.
///
/// States: `Idle` (hunting for `START`), `InFrame` (accumulating),
/// `Escaped` (next byte is XOR-masked). The buffer index and the
/// escape state are the only state variables.
pub struct FrameDecoder {
    state: DecoderState,
    buf: Vec<u8>,
    faults: u64,
}

impl FrameDecoder {
    /// Create an idle decoder with a worst-case-sized buffer.
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            buf: Vec::with_capacity(MAX_LOGICAL_SIZE),
            faults: 0,
        }
    }

    /// Consume one wire byte.
    ///
    /// Returns the completed logical packet when this byte was an
    /// unescaped `END` closing a non-empty frame.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        match self.state {
            DecoderState::Idle => {
                if byte == START_BYTE {
                    self.state = DecoderState::InFrame;
                    self.buf.clear();
                }
                None
            }
            DecoderState::InFrame => match byte {
                START_BYTE => {
                    // A START mid-frame means the previous frame was
                    // truncated; resynchronize on the new one.
                    if !self.buf.is_empty() {
                        self.faults += 1;
                        trace!(dropped = self.buf.len(), "resynchronized on START");
                    }
                    self.buf.clear();
                    None
                }
                END_BYTE => {
                    self.state = DecoderState::Idle;
                    if self.buf.is_empty() {
                        None
                    } else {
                        Some(&self.buf)
                    }
                }
                ESCAPE_BYTE => {
                    self.state = DecoderState::Escaped;
                    None
                }
                other => self.append(other),
            },
            DecoderState::Escaped => {
                self.state = DecoderState::InFrame;
                self.append(byte ^ ESCAPE_MASK)
            }
        }
    }

    /// Framing faults observed since construction (overflow, resync).
    pub fn faults(&self) -> u64 {
        self.faults
    }

    fn append(&mut self, byte: u8) -> Option<&[u8]> {
        if self.buf.len() >= MAX_LOGICAL_SIZE {
            warn!(limit = MAX_LOGICAL_SIZE, "receive buffer overflow, frame discarded");
            self.faults += 1;
            self.state = DecoderState::Idle;
            self.buf.clear();
        } else {
            self.buf.push(byte);
        }
        None
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
