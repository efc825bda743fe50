//! End-to-end scenarios over a simulated two-node (and three-node) bus.
//!
//! The wire is a pair of in-memory byte queues; nodes exchange real
//! framed, encrypted, authenticated packets exactly as they would over
//! a transceiver.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use securebus::core::{BROADCAST_ADDRESS, HEADER_SIZE, MASTER_KEY_SIZE};
use securebus::crypto::{derive_boot_key, KeyPool};
use securebus::packet::{seal_packet, Header, MsgType};
use securebus::prelude::*;
use securebus::transport::encode_frame;

const MASTER: [u8; MASTER_KEY_SIZE] = [0x32; MASTER_KEY_SIZE];

/// One end of a simulated bus segment. Thread-safe so a node can live
/// on its own thread when a scenario needs real concurrency.
#[derive(Clone)]
struct WirePort {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<VecDeque<u8>>>,
}

impl WirePort {
    /// Two ports whose transmit queues feed each other's receivers.
    fn pair() -> (Self, Self) {
        let line_ab = Arc::new(Mutex::new(VecDeque::new()));
        let line_ba = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                rx: line_ba.clone(),
                tx: line_ab.clone(),
            },
            Self {
                rx: line_ab,
                tx: line_ba,
            },
        )
    }

    /// A port wired to nothing; transmissions are collected, reads
    /// come from whatever the test injects.
    fn dangling() -> Self {
        Self {
            rx: Arc::new(Mutex::new(VecDeque::new())),
            tx: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn inject(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }

    fn drain_tx(&self) -> Vec<u8> {
        self.tx.lock().unwrap().drain(..).collect()
    }
}

impl SerialPort for WirePort {
    fn set_baud_rate(&mut self, _baud: u32) -> io::Result<()> {
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tx.lock().unwrap().extend(bytes.iter().copied());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.rx.lock().unwrap().pop_front())
    }
}

fn fast_config() -> StackConfig {
    StackConfig {
        turnaround: TurnaroundTiming {
            t_enable: Duration::ZERO,
            t_disable: Duration::ZERO,
        },
        ack_timeout: Duration::from_millis(50),
        ack_poll_interval: Duration::from_millis(1),
    }
}

type DeliveryLog = Arc<Mutex<Vec<(u8, MsgType, Option<Vec<u8>>)>>>;

fn record_into(stack: &mut SecureStack<WirePort>) -> DeliveryLog {
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    stack.register_receive_callback(move |msg| {
        let body = match msg.body {
            Body::Plaintext(bytes) => Some(bytes.to_vec()),
            Body::KeyMismatch => None,
        };
        sink.lock().unwrap().push((msg.source, msg.msg_type, body));
    });
    log
}

/// S1: round-trip unicast with a live acknowledgement.
///
/// The receiver runs on its own thread so the sender's blocking ACK
/// wait is answered while it is still waiting.
#[test]
fn s1_round_trip_unicast() {
    let (port_a, port_b) = WirePort::pair();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));
    let stop = Arc::new(AtomicBool::new(false));

    let receiver_handle = {
        let log = log.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut receiver = SecureStack::with_config(port_b, 2, MASTER, fast_config());
            receiver.register_receive_callback(move |msg| {
                let body = match msg.body {
                    Body::Plaintext(bytes) => Some(bytes.to_vec()),
                    Body::KeyMismatch => None,
                };
                log.lock().unwrap().push((msg.source, msg.msg_type, body));
            });
            while !stop.load(Ordering::Relaxed) {
                receiver.process_incoming().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
            receiver.stats()
        })
    };

    let mut sender = SecureStack::with_config(port_a, 1, MASTER, fast_config());
    sender
        .send_message(2, MsgType::Data, b"hello", true)
        .expect("acknowledged send");

    stop.store(true, Ordering::Relaxed);
    let receiver_stats = receiver_handle.join().unwrap();

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(1, MsgType::Data, Some(b"hello".to_vec()))]
    );
    assert_eq!(receiver_stats.delivered, 1);
    assert_eq!(sender.stats().sent, 1);
}

/// S2: nodes booted with different master keys cannot exchange traffic.
#[test]
fn s2_wrong_master_key_rejects() {
    let (port_a, port_b) = WirePort::pair();
    let mut sender = SecureStack::with_config(port_a, 1, [b'A'; MASTER_KEY_SIZE], fast_config());
    let mut receiver = SecureStack::with_config(port_b, 2, [b'B'; MASTER_KEY_SIZE], fast_config());
    let log = record_into(&mut receiver);

    let err = sender
        .send_message(2, MsgType::Data, b"x", true)
        .unwrap_err();
    assert!(matches!(err, BusError::AckTimeout));

    receiver.process_incoming().unwrap();

    assert!(log.lock().unwrap().is_empty());
    assert_eq!(receiver.stats().integrity_faults, 1);
}

/// S3: a single flipped ciphertext bit is caught by the MAC; nothing
/// reaches the callback.
#[test]
fn s3_ciphertext_bit_flip() {
    let pool = KeyPool::new(&MASTER);
    let header = Header {
        source: 1,
        target: 2,
        msg_type: MsgType::Data,
        key_id: 0,
        iv: [0x0F; 16],
    };
    let mut logical =
        seal_packet(&header, pool.active_key(), &MASTER, b"payload", false).unwrap();
    logical[HEADER_SIZE] ^= 0x04; // first ciphertext byte

    let port = WirePort::dangling();
    let mut receiver = SecureStack::with_config(port.clone(), 2, MASTER, fast_config());
    let log = record_into(&mut receiver);

    port.inject(&encode_frame(&logical));
    receiver.process_incoming().unwrap();

    assert!(log.lock().unwrap().is_empty());
    assert_eq!(receiver.stats().integrity_faults, 1);
    // The source field of a MAC-failed packet is untrusted; no NACK.
    assert!(port.drain_tx().is_empty());
}

/// S4: every non-sender node delivers a broadcast; none acknowledges.
#[test]
fn s4_broadcast() {
    let sender_port = WirePort::dangling();
    let mut sender = SecureStack::with_config(sender_port.clone(), 1, MASTER, fast_config());

    sender
        .send_message(BROADCAST_ADDRESS, MsgType::Data, b"to all", false)
        .unwrap();
    let frame = sender_port.drain_tx();

    for address in [2u8, 3u8] {
        let port = WirePort::dangling();
        let mut node = SecureStack::with_config(port.clone(), address, MASTER, fast_config());
        let log = record_into(&mut node);

        port.inject(&frame);
        node.process_incoming().unwrap();

        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[(1, MsgType::Data, Some(b"to all".to_vec()))]
        );
        assert!(port.drain_tx().is_empty(), "node {address} acknowledged a broadcast");
    }
}

/// S5: rotation to key 1 via a K message, then a replay under the
/// retired key 0 surfaces as a key mismatch.
#[test]
fn s5_key_rotation() {
    let (port_master, port_slave) = WirePort::pair();
    let mut master = SecureStack::with_config(port_master.clone(), 1, MASTER, fast_config());
    let mut slave = SecureStack::with_config(port_slave.clone(), 2, MASTER, fast_config());
    let slave_log = record_into(&mut slave);

    // Capture a frame under key 0 for the later replay.
    let boot_key = derive_boot_key(&MASTER);
    let replay_header = Header {
        source: 1,
        target: 2,
        msg_type: MsgType::Data,
        key_id: 0,
        iv: [0x21; 16],
    };
    let replay_logical =
        seal_packet(&replay_header, &boot_key, &MASTER, b"old epoch", false).unwrap();

    // Master distributes key 1 with a K message and switches locally.
    let new_key = [0x77u8; 16];
    let mut k_payload = Vec::new();
    k_payload.extend_from_slice(&1u16.to_be_bytes());
    k_payload.extend_from_slice(&new_key);
    master
        .send_message(2, MsgType::KeyUpdate, &k_payload, false)
        .unwrap();
    master.install_key(1, &new_key).unwrap();
    master.activate_key(1).unwrap();

    // Slave host policy: apply the K message, then drop the old slot.
    slave.process_incoming().unwrap();
    {
        let log = slave_log.lock().unwrap();
        let (source, msg_type, body) = log.last().expect("K message delivered");
        assert_eq!((*source, *msg_type), (1, MsgType::KeyUpdate));
        let body = body.as_ref().unwrap();
        let id = u16::from_be_bytes([body[0], body[1]]);
        assert_eq!(id, 1);
        assert_eq!(&body[2..], &new_key);
    }
    slave.install_key(1, &new_key).unwrap();
    slave.activate_key(1).unwrap();
    slave.retire_key(0).unwrap();

    // Traffic under the new key flows.
    master
        .send_message(2, MsgType::Data, b"after", false)
        .unwrap();
    slave.process_incoming().unwrap();
    assert_eq!(
        slave_log.lock().unwrap().last().unwrap(),
        &(1, MsgType::Data, Some(b"after".to_vec()))
    );

    // Replayed key-0 traffic still MAC-verifies but yields no
    // plaintext once the slot is gone.
    port_slave.inject(&encode_frame(&replay_logical));
    slave.process_incoming().unwrap();
    assert_eq!(slave_log.lock().unwrap().last().unwrap(), &(1, MsgType::Data, None));
    assert_eq!(slave.stats().key_mismatches, 1);
}

/// S6: leading garbage is discarded; the frame behind it is delivered
/// exactly once.
#[test]
fn s6_framing_resync() {
    let port = WirePort::dangling();
    let mut receiver = SecureStack::with_config(port.clone(), 2, MASTER, fast_config());
    let log = record_into(&mut receiver);

    let pool = KeyPool::new(&MASTER);
    let header = Header {
        source: 1,
        target: 2,
        msg_type: MsgType::Data,
        key_id: 0,
        iv: [0x33; 16],
    };
    let logical = seal_packet(&header, pool.active_key(), &MASTER, b"resync", false).unwrap();

    port.inject(&[0x00, 0x00]);
    port.inject(&encode_frame(&logical));
    receiver.process_incoming().unwrap();

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(1, MsgType::Data, Some(b"resync".to_vec()))]
    );
}

/// The rotation manager drives a full on-bus key distribution.
#[test]
fn rotation_manager_distributes_over_bus() {
    let (port_master, port_slave) = WirePort::pair();
    let mut master = SecureStack::with_config(port_master, 1, MASTER, fast_config());
    let mut slave = SecureStack::with_config(port_slave, 2, MASTER, fast_config());
    let slave_log = record_into(&mut slave);

    let mut manager = KeyRotationManager::with_policy(
        master.current_key_id(),
        RotationPolicy {
            interval: Duration::ZERO,
            message_threshold: 2,
        },
    );

    for _ in 0..2 {
        master.send_message(2, MsgType::Data, b"tick", false).unwrap();
        manager.notify_message_sent();
        slave.process_incoming().unwrap();
    }

    let rotated = manager
        .poll(|id, key| {
            let mut payload = Vec::with_capacity(2 + key.len());
            payload.extend_from_slice(&id.to_be_bytes());
            payload.extend_from_slice(key);
            master.send_message(2, MsgType::KeyUpdate, &payload, false)?;
            master.install_key(id, key)?;
            master.activate_key(id)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(rotated, Some(1));
    assert_eq!(master.current_key_id(), 1);
    assert_eq!(manager.messages_since_rotation(), 0);

    // Slave applies the distributed key and keeps receiving.
    slave.process_incoming().unwrap();
    let (id, key) = {
        let log = slave_log.lock().unwrap();
        let (_, msg_type, body) = log.last().unwrap();
        assert_eq!(*msg_type, MsgType::KeyUpdate);
        let body = body.as_ref().unwrap();
        let mut key = [0u8; 16];
        key.copy_from_slice(&body[2..]);
        (u16::from_be_bytes([body[0], body[1]]), key)
    };
    slave.install_key(id, &key).unwrap();
    slave.activate_key(id).unwrap();

    master
        .send_message(2, MsgType::Data, b"fresh epoch", false)
        .unwrap();
    slave.process_incoming().unwrap();
    assert_eq!(
        slave_log.lock().unwrap().last().unwrap(),
        &(1, MsgType::Data, Some(b"fresh epoch".to_vec()))
    );
}

/// Payload length 16 occupies two blocks on the wire (data + padding).
#[test]
fn boundary_block_aligned_payload() {
    let pool = KeyPool::new(&MASTER);
    let header = Header {
        source: 1,
        target: 2,
        msg_type: MsgType::Data,
        key_id: 0,
        iv: [0x44; 16],
    };
    let logical = seal_packet(&header, pool.active_key(), &MASTER, &[0xAA; 16], false).unwrap();
    // header + two ciphertext blocks + tag
    assert_eq!(logical.len(), HEADER_SIZE + 32 + 32);
}
