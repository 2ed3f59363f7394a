//! Shared playback clock.
//!
//! Single source of truth for synchronization. In `AudioMaster` mode the
//! audio pipeline advances the clock (anchor PTS plus samples written since);
//! in `External` mode the clock free-runs from a wall-clock anchor, which is
//! the fallback when no audio device could be opened. The other pipeline only
//! ever reads.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Which pipeline advances the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Audio pipeline is authoritative.
    AudioMaster,
    /// Free-running wall clock (no audio device, or audio disabled).
    External,
}

/// What the video pipeline should do with a frame at a given PTS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Display,
    Drop,
    Wait(Duration),
}

// Display tolerance and the largest single correction we apply.
const SYNC_THRESHOLD_US: i64 = 40_000;
const MAX_CORRECTION_US: i64 = 100_000;

pub struct PlaybackClock {
    mode: Mutex<ClockMode>,
    pts_us: AtomicI64,
    samples_written: AtomicU64,
    sample_rate: AtomicU32,
    anchor: Mutex<Instant>,
    running: AtomicBool,
}

impl PlaybackClock {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            pts_us: AtomicI64::new(0),
            samples_written: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            anchor: Mutex::new(Instant::now()),
            running: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> ClockMode {
        *self.mode.lock()
    }

    /// Switch clock source. Current time is carried over so playback does
    /// not jump.
    pub fn set_mode(&self, mode: ClockMode) {
        let now = self.time_us();
        let mut guard = self.mode.lock();
        self.pts_us.store(now, Ordering::SeqCst);
        self.samples_written.store(0, Ordering::SeqCst);
        *self.anchor.lock() = Instant::now();
        *guard = mode;
    }

    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::SeqCst);
    }

    /// Re-anchor the clock at a new PTS. Called by the authoritative
    /// pipeline only.
    pub fn update(&self, pts_us: i64) {
        self.pts_us.store(pts_us, Ordering::SeqCst);
        self.samples_written.store(0, Ordering::SeqCst);
        *self.anchor.lock() = Instant::now();
    }

    /// Account samples written to the audio device since the last anchor.
    pub fn add_samples(&self, frames: u64) {
        self.samples_written.fetch_add(frames, Ordering::SeqCst);
    }

    pub fn set_running(&self, running: bool) {
        if running {
            *self.anchor.lock() = Instant::now();
        }
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current playback time in microseconds.
    pub fn time_us(&self) -> i64 {
        let base = self.pts_us.load(Ordering::SeqCst);
        if !self.running.load(Ordering::SeqCst) {
            return base;
        }
        match *self.mode.lock() {
            ClockMode::AudioMaster => {
                let rate = self.sample_rate.load(Ordering::SeqCst);
                if rate == 0 {
                    return base;
                }
                let samples = self.samples_written.load(Ordering::SeqCst);
                base + (samples as i64 * 1_000_000) / rate as i64
            }
            ClockMode::External => {
                let elapsed = self.anchor.lock().elapsed().as_micros() as i64;
                base + elapsed
            }
        }
    }

    pub fn time_ms(&self) -> i64 {
        self.time_us() / 1_000
    }

    pub fn reset(&self) {
        self.pts_us.store(0, Ordering::SeqCst);
        self.samples_written.store(0, Ordering::SeqCst);
        *self.anchor.lock() = Instant::now();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Pacing decision for a video frame against the shared clock.
    pub fn frame_decision(&self, frame_pts_us: i64) -> SyncDecision {
        if !self.is_running() {
            return SyncDecision::Display;
        }
        let drift = frame_pts_us - self.time_us();
        if drift.abs() <= SYNC_THRESHOLD_US {
            SyncDecision::Display
        } else if drift > SYNC_THRESHOLD_US {
            // Frame is early - hold it back, bounded so a bad PTS cannot
            // stall the pipeline.
            let wait = drift.min(MAX_CORRECTION_US);
            SyncDecision::Wait(Duration::from_micros(wait as u64))
        } else if drift < -MAX_CORRECTION_US {
            SyncDecision::Drop
        } else {
            SyncDecision::Display
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(ClockMode::AudioMaster)
    }
}
