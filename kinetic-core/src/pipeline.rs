//! Per-stream pipeline: decode -> sync -> render for one stream kind.
//!
//! Setup and reset follow a small state machine:
//!
//! ```text
//! Uninitialized -> Configuring -> Active -> Reconfiguring -> Active -> ... -> TornDown
//! ```
//!
//! The worker thread is created once, on the first successful configuration,
//! and reconfigured in place afterwards: decoder swapped, sinks rebound,
//! queue resized. The control path serializes with the worker through a
//! pause gate - the worker acknowledges the pause before any of its state is
//! touched, so it can never observe a half-configured pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::audio_output::AudioOutput;
use crate::clock::{ClockMode, PlaybackClock, SyncDecision};
use crate::decoder::Decoder;
use crate::frame::{DecodedFrame, FrameFilter, OutputSet};
use crate::packet_queue::{PacketQueue, QueueConfig};
use crate::source::StreamKind;

/// Audio device handle shared between the player (owner) and the audio
/// pipeline (writer).
pub type SharedAudioOutput = Arc<Mutex<Option<Box<dyn AudioOutput>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Configuring,
    Active,
    Reconfiguring,
    TornDown,
}

const POP_TIMEOUT: Duration = Duration::from_millis(20);

struct Gate {
    paused: bool,
    /// Worker acknowledgment that it is parked at the gate.
    idle: bool,
}

struct PipelineShared {
    kind: StreamKind,
    queue: Arc<PacketQueue>,
    decoder: Mutex<Option<Box<dyn Decoder>>>,
    filters: Mutex<Vec<Arc<dyn FrameFilter>>>,
    clock: Arc<PlaybackClock>,
    video_out: Mutex<Option<Arc<OutputSet>>>,
    audio_out: Mutex<Option<SharedAudioOutput>>,
    stop: AtomicBool,
    gate: Mutex<Gate>,
    gate_cv: Condvar,
}

/// One stream pipeline. Owns its decoder, packet queue and worker thread;
/// references (never owns) the render sinks.
pub struct StreamPipeline {
    state: PipelineState,
    shared: Arc<PipelineShared>,
    worker: Option<JoinHandle<()>>,
}

impl StreamPipeline {
    pub fn new(kind: StreamKind, clock: Arc<PlaybackClock>) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            shared: Arc::new(PipelineShared {
                kind,
                queue: Arc::new(PacketQueue::default()),
                decoder: Mutex::new(None),
                filters: Mutex::new(Vec::new()),
                clock,
                video_out: Mutex::new(None),
                audio_out: Mutex::new(None),
                stop: AtomicBool::new(false),
                gate: Mutex::new(Gate {
                    paused: true,
                    idle: true,
                }),
                gate_cv: Condvar::new(),
            }),
            worker: None,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.shared.kind
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn queue(&self) -> Arc<PacketQueue> {
        self.shared.queue.clone()
    }

    pub fn has_decoder(&self) -> bool {
        self.shared.decoder.lock().is_some()
    }

    /// Enter Configuring (first time) or Reconfiguring: pause the worker and
    /// wait for its acknowledgment, clear the packet queue, detach the old
    /// decoder. The previous decoder is handed back so the caller can read
    /// its name into the statistics refresh before dropping it.
    pub fn begin_reconfigure(&mut self) -> Option<Box<dyn Decoder>> {
        self.state = match self.state {
            PipelineState::Uninitialized | PipelineState::Configuring => PipelineState::Configuring,
            _ => PipelineState::Reconfiguring,
        };
        self.pause_worker();
        self.shared.queue.clear();
        self.shared.decoder.lock().take()
    }

    fn pause_worker(&self) {
        let mut gate = self.shared.gate.lock();
        gate.paused = true;
        if self.worker.is_some() {
            while !gate.idle {
                self.shared.gate_cv.wait(&mut gate);
            }
        } else {
            gate.idle = true;
        }
    }

    /// Bind the video sink set (shared by reference, not owned).
    pub fn set_video_output(&self, outputs: Option<Arc<OutputSet>>) {
        *self.shared.video_out.lock() = outputs;
    }

    /// Bind the shared audio device handle.
    pub fn set_audio_output(&self, output: Option<SharedAudioOutput>) {
        *self.shared.audio_out.lock() = output;
    }

    /// Complete a (re)configuration: install the new decoder and filters,
    /// reapply queue sizing, start the worker on first use, resume.
    pub fn install(
        &mut self,
        decoder: Box<dyn Decoder>,
        filters: Vec<Arc<dyn FrameFilter>>,
        queue_config: QueueConfig,
    ) {
        *self.shared.decoder.lock() = Some(decoder);
        *self.shared.filters.lock() = filters;
        self.shared.queue.set_config(queue_config);
        self.shared.queue.restart();

        if self.worker.is_none() {
            debug!(kind = self.shared.kind.label(), "starting pipeline worker");
            let shared = self.shared.clone();
            self.worker = Some(thread::spawn(move || run_worker(shared)));
        }

        let mut gate = self.shared.gate.lock();
        gate.paused = false;
        self.shared.gate_cv.notify_all();
        drop(gate);
        self.state = PipelineState::Active;
    }

    /// Leave the stream kind disabled: no decoder, no queue activity. The
    /// worker (if any) stays parked at the gate.
    pub fn disable(&mut self) {
        *self.shared.decoder.lock() = None;
        self.shared.queue.clear();
        self.state = PipelineState::Uninitialized;
    }

    /// Stop the worker, wait for it, then release decoder and sink
    /// references in that order.
    pub fn teardown(&mut self) {
        if self.state == PipelineState::TornDown {
            return;
        }
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.queue.stop();
        {
            let mut gate = self.shared.gate.lock();
            gate.paused = false;
            self.shared.gate_cv.notify_all();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        *self.shared.decoder.lock() = None;
        self.shared.audio_out.lock().take();
        self.shared.video_out.lock().take();
        self.state = PipelineState::TornDown;
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn run_worker(shared: Arc<PipelineShared>) {
    debug!(kind = shared.kind.label(), "pipeline worker running");
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        {
            let mut gate = shared.gate.lock();
            if gate.paused {
                if !gate.idle {
                    gate.idle = true;
                    shared.gate_cv.notify_all();
                }
                shared.gate_cv.wait_for(&mut gate, POP_TIMEOUT);
                continue;
            }
            gate.idle = false;
        }

        let Some(packet) = shared.queue.pop_blocking(POP_TIMEOUT) else {
            continue;
        };

        let frames = {
            let mut slot = shared.decoder.lock();
            let Some(decoder) = slot.as_mut() else {
                continue;
            };
            match decoder.decode(&packet) {
                Ok(frames) => frames,
                Err(e) => {
                    // The decoder's error callback has already reported this.
                    warn!(kind = shared.kind.label(), error = %e, "decode error");
                    continue;
                }
            }
        };

        for mut frame in frames {
            for filter in shared.filters.lock().iter() {
                filter.apply(&mut frame);
            }
            deliver(&shared, frame);
            if shared.stop.load(Ordering::SeqCst) {
                break;
            }
        }
    }
    debug!(kind = shared.kind.label(), "pipeline worker stopped");
}

fn deliver(shared: &PipelineShared, frame: DecodedFrame) {
    match frame {
        DecodedFrame::Audio(frame) => {
            let master = shared.clock.mode() == ClockMode::AudioMaster;
            if master {
                shared.clock.update(frame.pts_us);
            }
            if let Some(device) = shared.audio_out.lock().clone() {
                if let Some(output) = device.lock().as_mut() {
                    output.write(&frame.samples);
                }
            }
            if master {
                shared.clock.add_samples(frame.frame_count());
            }
        }
        DecodedFrame::Video(frame) => {
            match shared.clock.frame_decision(frame.pts_us) {
                SyncDecision::Drop => return,
                SyncDecision::Wait(delay) => thread::sleep(delay),
                SyncDecision::Display => {}
            }
            if let Some(outputs) = shared.video_out.lock().clone() {
                outputs.send_frame(&frame);
            }
        }
    }
}
