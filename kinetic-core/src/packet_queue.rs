//! Bounded packet FIFO with low/high water backpressure.
//!
//! One instance per stream pipeline. The demuxer's reader pushes compressed
//! packets; the pipeline worker pops them. The producer blocks when the
//! queue is at capacity and resumes once occupancy has drained back to the
//! low-water threshold, so neither side ever buffers unboundedly.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::packet::Packet;

/// Low/high water marks, derived from the video frame rate so the queue
/// holds roughly one second of media regardless of cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Low-water mark: the blocked producer resumes once occupancy has
    /// drained to this level.
    pub threshold: usize,
    /// High-water mark: the producer blocks at this occupancy.
    pub capacity: usize,
}

impl QueueConfig {
    /// Golden-ratio sizing: the threshold holds slightly less than a second
    /// at the low-water mark and the capacity expands to ~1.6x of that,
    /// leaving headroom for bursty demuxing. An unknown or zero frame rate
    /// floors at 24 so the queue is never degenerate.
    pub fn for_frame_rate(frame_rate: f64) -> Self {
        let threshold = (0.61803 * frame_rate.max(24.0)).floor() as usize;
        let capacity = (1.61803 * threshold as f64).floor() as usize;
        Self {
            threshold,
            capacity,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::for_frame_rate(0.0)
    }
}

struct Inner {
    packets: VecDeque<Packet>,
    config: QueueConfig,
    /// Producer gate. Set when the queue fills, cleared at the low-water
    /// mark, so a full queue does not thrash the producer awake per packet.
    producer_blocked: bool,
    stopped: bool,
}

/// Thread-safe bounded packet queue.
pub struct PacketQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    space: Condvar,
}

impl PacketQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                packets: VecDeque::with_capacity(config.capacity),
                config,
                producer_blocked: false,
                stopped: false,
            }),
            ready: Condvar::new(),
            space: Condvar::new(),
        }
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.lock().config
    }

    /// Reapply sizing. Called on every track or decoder change, even when
    /// the queue instance itself is reused.
    pub fn set_config(&self, config: QueueConfig) {
        let mut inner = self.inner.lock();
        debug!(
            threshold = config.threshold,
            capacity = config.capacity,
            "packet queue resized"
        );
        inner.config = config;
        if inner.packets.len() <= inner.config.threshold {
            inner.producer_blocked = false;
            self.space.notify_all();
        }
    }

    /// Push a packet, blocking while the queue is at capacity. Returns
    /// false when the queue was stopped before the packet could be queued.
    pub fn push(&self, packet: Packet) -> bool {
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return false;
            }
            if inner.packets.len() >= inner.config.capacity {
                inner.producer_blocked = true;
            }
            if !inner.producer_blocked {
                break;
            }
            self.space.wait(&mut inner);
        }
        inner.packets.push_back(packet);
        self.ready.notify_one();
        true
    }

    /// Non-blocking push; returns false when at capacity or stopped.
    pub fn try_push(&self, packet: Packet) -> bool {
        let mut inner = self.inner.lock();
        if inner.stopped || inner.packets.len() >= inner.config.capacity {
            return false;
        }
        inner.packets.push_back(packet);
        self.ready.notify_one();
        true
    }

    /// Pop the oldest packet, blocking up to `timeout` while empty.
    pub fn pop_blocking(&self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.packets.is_empty() {
            if inner.stopped {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            self.ready.wait_for(&mut inner, remaining);
        }
        let packet = inner.packets.pop_front();
        self.release_producer(&mut inner);
        packet
    }

    /// Non-blocking pop.
    pub fn pop(&self) -> Option<Packet> {
        let mut inner = self.inner.lock();
        let packet = inner.packets.pop_front();
        if packet.is_some() {
            self.release_producer(&mut inner);
        }
        packet
    }

    fn release_producer(&self, inner: &mut Inner) {
        if inner.producer_blocked && inner.packets.len() <= inner.config.threshold {
            inner.producer_blocked = false;
            self.space.notify_all();
        }
    }

    /// Drop all queued packets and wake both sides.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.packets.clear();
        inner.producer_blocked = false;
        self.ready.notify_all();
        self.space.notify_all();
    }

    /// Stop the queue: wake all waiters, reject further traffic.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        self.ready.notify_all();
        self.space.notify_all();
    }

    /// Re-arm a stopped queue for reuse after a reconfiguration.
    pub fn restart(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = false;
        inner.producer_blocked = false;
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().packets.is_empty()
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}
