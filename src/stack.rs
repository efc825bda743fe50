//! The host-facing secure stack.
//!
//! One [`SecureStack`] owns the serial port, the direction control,
//! the session-key pool, and the receive state machine. All operations
//! are called sequentially from a single host loop: `process_incoming`
//! drains the UART without blocking, `send_message` blocks for the
//! transmit turnaround and (optionally) the acknowledgement wait.
//! Multi-threaded hosts must wrap the stack in a single owning actor
//! rather than share it.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::{
    BusError, CryptoError, DirectionControl, PacketError, SerialPort, ACK_POLL_INTERVAL,
    AES_KEY_SIZE, BROADCAST_ADDRESS, HEADER_SIZE, MASTER_KEY_SIZE, T_ACK,
};
use crate::crypto::{random_iv, KeyPool};
use crate::packet::{open_packet, seal_packet, Header, MsgType, Opened};
use crate::transport::{encode_frame, transmit, AutoDirection, FrameDecoder, TurnaroundTiming};
use zeroize::Zeroize;

/// Tunable timing for a stack instance.
#[derive(Debug, Clone, Copy)]
pub struct StackConfig {
    /// Half-duplex turnaround delays.
    pub turnaround: TurnaroundTiming,
    /// How long `send_message` waits for an acknowledgement.
    pub ack_timeout: Duration,
    /// Serial poll interval inside the acknowledgement wait.
    pub ack_poll_interval: Duration,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            turnaround: TurnaroundTiming::default(),
            ack_timeout: T_ACK,
            ack_poll_interval: ACK_POLL_INTERVAL,
        }
    }
}

/// Monotonic event counters, readable by the host for monitoring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StackStats {
    /// Application messages transmitted.
    pub sent: u64,
    /// Packets delivered to the receive callback with plaintext.
    pub delivered: u64,
    /// MAC, CRC, or padding failures (packet dropped).
    pub integrity_faults: u64,
    /// Framing-layer faults (overflow, resynchronization).
    pub framing_faults: u64,
    /// MAC-valid packets whose key id matched no usable slot.
    pub key_mismatches: u64,
}

/// Payload view handed to the receive callback.
#[derive(Debug, PartialEq, Eq)]
pub enum Body<'a> {
    /// Authenticated, decrypted application bytes.
    Plaintext(&'a [u8]),
    /// The packet authenticated but was encrypted under a key this
    /// node does not hold; no plaintext is available.
    KeyMismatch,
}

/// A delivered message.
#[derive(Debug, PartialEq, Eq)]
pub struct Received<'a> {
    /// Sender node address.
    pub source: u8,
    /// Message type token.
    pub msg_type: MsgType,
    /// Payload view.
    pub body: Body<'a>,
}

type ReceiveCallback = Box<dyn FnMut(Received<'_>)>;

/// Tracks an in-flight acknowledgement wait.
struct AckWaiter {
    peer: u8,
    outcome: Option<Result<(), String>>,
}

/// The secure bus stack for one node.
pub struct SecureStack<S: SerialPort> {
    serial: S,
    direction: Box<dyn DirectionControl>,
    local_address: u8,
    master_key: [u8; MASTER_KEY_SIZE],
    pool: KeyPool,
    decoder: FrameDecoder,
    callback: Option<ReceiveCallback>,
    config: StackConfig,
    ack_enabled: bool,
    crc_enabled: bool,
    stats: StackStats,
}

impl<S: SerialPort> SecureStack<S> {
    /// Build a stack with default timing.
    ///
    /// Slot 0 of the key pool is derived from the master key and
    /// active, so the node can exchange traffic immediately.
    pub fn new(serial: S, local_address: u8, master_key: [u8; MASTER_KEY_SIZE]) -> Self {
        Self::with_config(serial, local_address, master_key, StackConfig::default())
    }

    /// Build a stack with explicit timing.
    pub fn with_config(
        serial: S,
        local_address: u8,
        master_key: [u8; MASTER_KEY_SIZE],
        config: StackConfig,
    ) -> Self {
        let pool = KeyPool::new(&master_key);
        Self {
            serial,
            direction: Box::new(AutoDirection),
            local_address,
            master_key,
            pool,
            decoder: FrameDecoder::new(),
            callback: None,
            config,
            ack_enabled: true,
            crc_enabled: false,
            stats: StackStats::default(),
        }
    }

    /// Configure the port speed and initialize direction control.
    pub fn begin(&mut self, baud: u32) -> Result<(), BusError> {
        self.serial
            .set_baud_rate(baud)
            .map_err(BusError::BaudRateFailed)?;
        self.direction.begin();
        info!(baud, address = self.local_address, "secure bus stack started");
        Ok(())
    }

    /// Replace the direction-control actuator.
    ///
    /// Defaults to the no-op [`AutoDirection`] for auto-DE transceivers.
    pub fn set_direction_control(&mut self, direction: Box<dyn DirectionControl>) {
        self.direction = direction;
    }

    /// Register the function invoked for every delivered message.
    pub fn register_receive_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Received<'_>) + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Enable or disable sending of ACK/NACK responses.
    pub fn set_ack_enabled(&mut self, enabled: bool) {
        self.ack_enabled = enabled;
    }

    /// Enable or disable the CRC-16 early-reject gate.
    ///
    /// Both peers must agree on this setting; it changes the packet
    /// layout.
    pub fn set_crc_enabled(&mut self, enabled: bool) {
        self.crc_enabled = enabled;
    }

    /// Reconfigure the port speed (e.g. after a `B` message).
    pub fn set_baud_rate(&mut self, baud: u32) -> Result<(), BusError> {
        self.serial
            .set_baud_rate(baud)
            .map_err(BusError::BaudRateFailed)?;
        info!(baud, "baud rate updated");
        Ok(())
    }

    /// Copy a session key into a pool slot.
    pub fn install_key(&mut self, id: u16, key: &[u8; AES_KEY_SIZE]) -> Result<(), BusError> {
        self.pool.install_key(id, key)?;
        debug!(key_id = id, "session key installed");
        Ok(())
    }

    /// Switch the active session key.
    pub fn activate_key(&mut self, id: u16) -> Result<(), BusError> {
        self.pool.activate_key(id)?;
        info!(key_id = id, "session key activated");
        Ok(())
    }

    /// Deinitialize a non-active slot.
    pub fn retire_key(&mut self, id: u16) -> Result<(), BusError> {
        self.pool.retire_key(id)?;
        debug!(key_id = id, "session key retired");
        Ok(())
    }

    /// Identifier of the active session key.
    pub fn current_key_id(&self) -> u16 {
        self.pool.current_key_id()
    }

    /// This node's bus address.
    pub fn local_address(&self) -> u8 {
        self.local_address
    }

    /// Snapshot of the event counters.
    pub fn stats(&self) -> StackStats {
        StackStats {
            framing_faults: self.decoder.faults(),
            ..self.stats
        }
    }

    /// Drain buffered serial bytes through the receive pipeline.
    ///
    /// Non-blocking: returns once the UART buffer is empty. Framing
    /// and integrity faults are counted and logged, never returned;
    /// the only error here is a failing serial read.
    pub fn process_incoming(&mut self) -> Result<(), BusError> {
        self.drain_serial(None)
    }

    /// Encrypt, authenticate, frame, and transmit one message.
    ///
    /// With `require_ack` the call blocks until the addressed node
    /// acknowledges, a NACK arrives, or the wait window elapses.
    /// Unrelated packets received during the wait flow through the
    /// normal receive path.
    pub fn send_message(
        &mut self,
        target: u8,
        msg_type: MsgType,
        payload: &[u8],
        require_ack: bool,
    ) -> Result<(), BusError> {
        if require_ack && target == BROADCAST_ADDRESS {
            return Err(BusError::AckOnBroadcast);
        }

        self.transmit_packet(target, msg_type, payload)?;
        self.stats.sent += 1;

        if require_ack {
            self.wait_for_ack(target)
        } else {
            Ok(())
        }
    }

    fn transmit_packet(
        &mut self,
        target: u8,
        msg_type: MsgType,
        payload: &[u8],
    ) -> Result<(), BusError> {
        let header = Header {
            source: self.local_address,
            target,
            msg_type,
            key_id: self.pool.current_key_id(),
            iv: random_iv(),
        };
        let logical = seal_packet(
            &header,
            self.pool.active_key(),
            &self.master_key,
            payload,
            self.crc_enabled,
        )?;
        let frame = encode_frame(&logical);
        transmit(
            &mut self.serial,
            self.direction.as_mut(),
            &self.config.turnaround,
            &frame,
        )
    }

    fn wait_for_ack(&mut self, peer: u8) -> Result<(), BusError> {
        let deadline = Instant::now() + self.config.ack_timeout;
        let mut waiter = AckWaiter {
            peer,
            outcome: None,
        };

        loop {
            self.drain_serial(Some(&mut waiter))?;
            if let Some(outcome) = waiter.outcome.take() {
                return outcome.map_err(BusError::NackReceived);
            }
            if Instant::now() >= deadline {
                debug!(peer, "acknowledgement wait timed out");
                return Err(BusError::AckTimeout);
            }
            thread::sleep(self.config.ack_poll_interval);
        }
    }

    fn drain_serial(&mut self, mut waiter: Option<&mut AckWaiter>) -> Result<(), BusError> {
        while let Some(byte) = self
            .serial
            .read_byte()
            .map_err(BusError::SerialReadFailed)?
        {
            if let Some(frame) = self.decoder.push(byte) {
                let logical = frame.to_vec();
                self.handle_frame(&logical, waiter.as_deref_mut());
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, logical: &[u8], waiter: Option<&mut AckWaiter>) {
        match open_packet(
            logical,
            &self.master_key,
            self.local_address,
            &self.pool,
            self.crc_enabled,
        ) {
            Ok(None) => {
                debug!("packet addressed elsewhere, dropped after MAC check");
            }
            Ok(Some(Opened::Plaintext { header, payload })) => {
                if let Some(w) = waiter {
                    if w.outcome.is_none()
                        && header.msg_type.is_ack_kind()
                        && header.source == w.peer
                        && header.target == self.local_address
                    {
                        w.outcome = Some(parse_ack_payload(&payload));
                        return;
                    }
                }

                self.stats.delivered += 1;
                if let Some(cb) = self.callback.as_mut() {
                    cb(Received {
                        source: header.source,
                        msg_type: header.msg_type,
                        body: Body::Plaintext(&payload),
                    });
                }

                if self.should_respond(&header) {
                    if let Err(e) = self.transmit_packet(header.source, MsgType::Ack, b"ACK") {
                        warn!(error = %e, "failed to send ACK");
                    }
                }
            }
            Ok(Some(Opened::KeyMismatch { header })) => {
                self.stats.key_mismatches += 1;
                warn!(
                    key_id = header.key_id,
                    source = header.source,
                    "packet under an unusable key id"
                );
                if let Some(cb) = self.callback.as_mut() {
                    cb(Received {
                        source: header.source,
                        msg_type: header.msg_type,
                        body: Body::KeyMismatch,
                    });
                }
                if self.should_respond(&header) {
                    if let Err(e) =
                        self.transmit_packet(header.source, MsgType::Nack, b"NACK:key mismatch")
                    {
                        warn!(error = %e, "failed to send NACK");
                    }
                }
            }
            Err(e) => {
                self.stats.integrity_faults += 1;
                warn!(error = %e, "packet rejected");

                // Only padding faults earn a NACK: the header has been
                // authenticated by then. A failed MAC leaves the source
                // field untrusted, so it is never answered.
                if matches!(e, PacketError::Crypto(CryptoError::BadPadding)) {
                    if let Ok(header) = Header::from_bytes(&logical[..HEADER_SIZE]) {
                        if self.should_respond(&header) {
                            if let Err(e) = self.transmit_packet(
                                header.source,
                                MsgType::Nack,
                                b"NACK:bad padding",
                            ) {
                                warn!(error = %e, "failed to send NACK");
                            }
                        }
                    }
                }
            }
        }
    }

    /// ACK/NACK policy: enabled, unicast to this node, and the message
    /// is not itself an acknowledgement. Broadcasts are never answered.
    fn should_respond(&self, header: &Header) -> bool {
        self.ack_enabled
            && header.target == self.local_address
            && !header.msg_type.is_ack_kind()
    }
}

impl<S: SerialPort> Drop for SecureStack<S> {
    fn drop(&mut self) {
        self.master_key.zeroize();
    }
}

fn parse_ack_payload(payload: &[u8]) -> Result<(), String> {
    if payload == b"ACK" {
        Ok(())
    } else if let Some(reason) = payload.strip_prefix(b"NACK:") {
        Err(String::from_utf8_lossy(reason).into_owned())
    } else {
        Err(String::from_utf8_lossy(payload).into_owned())
    }
}
