//! Half-duplex line discipline: direction control and timed turnaround.
//!
//! The bus is driven by exactly one transmitter at a time. A send
//! asserts transmit-enable, waits for the transceiver to start driving
//! the line, writes and flushes the frame, waits out the last stop
//! bit, and releases the line again. The two waits are the contract;
//! their durations are configuration.

use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::core::{BusError, DirectionControl, SerialPort, T_DISABLE, T_ENABLE};

/// Turnaround delays for the transmit path.
#[derive(Debug, Clone, Copy)]
pub struct TurnaroundTiming {
    /// Wait after asserting transmit-enable, before the first byte.
    pub t_enable: Duration,
    /// Wait after the UART has flushed, before releasing the line.
    pub t_disable: Duration,
}

impl Default for TurnaroundTiming {
    fn default() -> Self {
        Self {
            t_enable: T_ENABLE,
            t_disable: T_DISABLE,
        }
    }
}

/// No-op direction control for transceivers with automatic DE/RE
/// switching.
pub struct AutoDirection;

impl DirectionControl for AutoDirection {
    fn begin(&mut self) {}
    fn set_transmit(&mut self) {}
    fn set_receive(&mut self) {}
}

/// Transmit one framed packet with the half-duplex turnaround.
///
/// On a write or flush failure the line is released immediately and
/// the error is returned; the stack never retries.
pub fn transmit<S: SerialPort>(
    serial: &mut S,
    direction: &mut dyn DirectionControl,
    timing: &TurnaroundTiming,
    frame: &[u8],
) -> Result<(), BusError> {
    direction.set_transmit();
    thread::sleep(timing.t_enable);

    let written = serial.write_all(frame).and_then(|()| serial.flush());
    match written {
        Ok(()) => {
            thread::sleep(timing.t_disable);
            direction.set_receive();
            trace!(len = frame.len(), "frame transmitted");
            Ok(())
        }
        Err(e) => {
            direction.set_receive();
            Err(BusError::SerialWriteFailed(e))
        }
    }
}
