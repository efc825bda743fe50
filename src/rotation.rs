//! Session-key rotation policy.
//!
//! The manager tracks wall-clock time and messages sent since the last
//! rotation. When either configured threshold is exceeded, [`poll`]
//! draws a fresh key from the OS RNG and hands it to a caller-supplied
//! distribution closure; the closure owns all I/O (typically a `K`
//! message to every node followed by `install_key` + `activate_key`
//! locally). The manager itself never touches the stack - the closure
//! parameter is the only seam between them, so there is no ownership
//! cycle.
//!
//! [`poll`]: KeyRotationManager::poll

use std::time::{Duration, Instant};

use tracing::{info, warn};
use zeroize::Zeroize;

use crate::core::{
    BusError, RotationError, AES_KEY_SIZE, ROTATION_INTERVAL, ROTATION_MESSAGE_THRESHOLD,
    SESSION_KEY_POOL_SIZE,
};
use crate::crypto::random_key;

/// Rotation thresholds. A zero value disables that axis.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    /// Rotate after this much wall-clock time.
    pub interval: Duration,
    /// Rotate after this many sent messages.
    pub message_threshold: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            interval: ROTATION_INTERVAL,
            message_threshold: ROTATION_MESSAGE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RotationState {
    Idle,
    Rotating,
}

/// Tracks rotation epochs and triggers distribution when one is due.
pub struct KeyRotationManager {
    policy: RotationPolicy,
    epoch_start: Instant,
    messages_sent: u64,
    current_id: u16,
    pool_capacity: u16,
    state: RotationState,
}

impl KeyRotationManager {
    /// Create a manager tracking the given active key id.
    pub fn new(current_id: u16) -> Self {
        Self::with_policy(current_id, RotationPolicy::default())
    }

    /// Create a manager with explicit thresholds.
    pub fn with_policy(current_id: u16, policy: RotationPolicy) -> Self {
        Self {
            policy,
            epoch_start: Instant::now(),
            messages_sent: 0,
            current_id,
            pool_capacity: SESSION_KEY_POOL_SIZE as u16,
            state: RotationState::Idle,
        }
    }

    /// Record one sent message toward the count threshold.
    pub fn notify_message_sent(&mut self) {
        self.messages_sent = self.messages_sent.saturating_add(1);
    }

    /// The key id this manager considers current.
    pub fn current_key_id(&self) -> u16 {
        self.current_id
    }

    /// Wall-clock time since the last committed rotation.
    pub fn time_since_rotation(&self) -> Duration {
        self.epoch_start.elapsed()
    }

    /// Messages sent since the last committed rotation.
    pub fn messages_since_rotation(&self) -> u64 {
        self.messages_sent
    }

    /// True when either enabled threshold has been crossed.
    pub fn due(&self) -> bool {
        let time_exceeded =
            !self.policy.interval.is_zero() && self.epoch_start.elapsed() >= self.policy.interval;
        let count_exceeded = self.policy.message_threshold > 0
            && self.messages_sent >= self.policy.message_threshold;
        time_exceeded || count_exceeded
    }

    /// Check the thresholds and rotate if due.
    ///
    /// `distribute` receives the next key id and the fresh key; it must
    /// deliver the key to every node and install it locally. On `Ok`
    /// the manager commits the new id and resets both counters; on
    /// `Err` the current key stays active and the epoch is unchanged.
    ///
    /// Returns the committed key id, or `None` when no rotation was due.
    pub fn poll<F>(&mut self, distribute: F) -> Result<Option<u16>, RotationError>
    where
        F: FnOnce(u16, &[u8; AES_KEY_SIZE]) -> Result<(), BusError>,
    {
        if !self.due() {
            return Ok(None);
        }
        if self.state == RotationState::Rotating {
            return Err(RotationError::InProgress);
        }

        let next_id = (self.current_id + 1) % self.pool_capacity;
        let mut new_key = random_key();

        self.state = RotationState::Rotating;
        let result = distribute(next_id, &new_key);
        new_key.zeroize();
        self.state = RotationState::Idle;

        match result {
            Ok(()) => {
                info!(
                    from = self.current_id,
                    to = next_id,
                    messages = self.messages_sent,
                    "session key rotated"
                );
                self.current_id = next_id;
                self.epoch_start = Instant::now();
                self.messages_sent = 0;
                Ok(Some(next_id))
            }
            Err(e) => {
                warn!(error = %e, "key distribution failed, keeping current key");
                Err(RotationError::RotationFailed(e))
            }
        }
    }
}
