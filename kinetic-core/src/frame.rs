//! Decoded frame types and the render-side seams.
//!
//! Video sinks are managed externally and shared with the pipeline by
//! reference; the pipeline never owns a renderer. Filters are passed into
//! pipeline configuration explicitly rather than looked up in any global
//! registry.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::audio_format::AudioFormat;

/// Pixel format of decoded video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Nv12,
    I420,
    P010,
    Rgba8,
}

impl PixelFormat {
    /// Buffer size for one frame at the given dimensions.
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            Self::Nv12 | Self::I420 => w * h * 3 / 2,
            Self::P010 => w * h * 3,
            Self::Rgba8 => w * h * 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nv12 => "nv12",
            Self::I420 => "i420",
            Self::P010 => "p010",
            Self::Rgba8 => "rgba8",
        }
    }
}

/// Decoded audio, interleaved f32.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pts_us: i64,
    pub format: AudioFormat,
    pub samples: Vec<f32>,
}

impl AudioFrame {
    /// Number of sample frames (one sample per channel).
    pub fn frame_count(&self) -> u64 {
        let channels = self.format.channels().max(1) as usize;
        (self.samples.len() / channels) as u64
    }
}

/// Decoded video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts_us: i64,
    pub duration_us: i64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

/// Output of one decode call.
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl DecodedFrame {
    pub fn pts_us(&self) -> i64 {
        match self {
            Self::Audio(f) => f.pts_us,
            Self::Video(f) => f.pts_us,
        }
    }
}

/// Per-stream frame filter, applied in order between decode and render.
pub trait FrameFilter: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, frame: &mut DecodedFrame);
}

/// Video render target. Implementations live outside this crate.
pub trait VideoSink: Send + Sync {
    fn display(&self, frame: &VideoFrame);
}

/// Set of video sinks, shared by reference between the player and the video
/// pipeline. The player owns the set; pipelines only send into it.
#[derive(Default)]
pub struct OutputSet {
    sinks: RwLock<Vec<Arc<dyn VideoSink>>>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&self, sink: Arc<dyn VideoSink>) {
        self.sinks.write().push(sink);
    }

    pub fn clear(&self) {
        self.sinks.write().clear();
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    pub fn send_frame(&self, frame: &VideoFrame) {
        for sink in self.sinks.read().iter() {
            sink.display(frame);
        }
    }
}
