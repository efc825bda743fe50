//! Core constants, error types, and collaborator traits.
//!
//! Everything in this module is shared by the other layers:
//!
//! - **Constants**: wire-format sizes, reserved bytes, timing defaults
//! - **Errors**: [`CryptoError`], [`PacketError`], [`BusError`], [`RotationError`]
//! - **Traits**: [`SerialPort`] and [`DirectionControl`] seams for the
//!   physical collaborators the stack does not own

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::{BusError, CryptoError, PacketError, RotationError};
pub use traits::{DirectionControl, SerialPort};
