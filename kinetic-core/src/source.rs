//! Demultiplexed source interface.
//!
//! The orchestrator does not parse containers itself. It talks to a
//! `MediaSource` collaborator that exposes elementary streams, their codec
//! parameters and container-level metadata. Stream references are only valid
//! until the next stream-selection call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::audio_format::{ChannelLayout, SampleFormat};
use crate::frame::PixelFormat;

/// The two elementary-stream categories this core manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Audio-specific codec parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    /// Channel count as reported by the container. May be 0 when only the
    /// layout is known; see [`AudioParams::correct_channels`].
    pub channels: u16,
    pub channel_layout: Option<ChannelLayout>,
    pub block_align: u32,
    pub frame_size: u32,
}

impl AudioParams {
    /// Fill in whichever of channel count / channel layout the container
    /// left out. Returns false when neither side is usable.
    pub fn correct_channels(&mut self) -> bool {
        if self.channels == 0 {
            if let Some(layout) = self.channel_layout {
                self.channels = layout.channels();
            }
        } else if self.channel_layout.is_none() {
            self.channel_layout = ChannelLayout::default_for(self.channels);
        }
        self.channels > 0
    }
}

/// Video-specific codec parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub coded_width: u32,
    pub coded_height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub gop_size: u32,
    pub frame_rate: f64,
}

/// Codec parameters for one elementary stream.
///
/// A value snapshot, not a live handle: the orchestrator copies what it
/// needs at selection time and never holds into the source's own storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecParameters {
    pub kind: StreamKind,
    /// Short codec name ("aac", "h264", ...).
    pub codec: String,
    pub bit_rate: u64,
    /// Stream time base as numerator / denominator.
    pub time_base: (u32, u32),
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub frame_count: u64,
    pub audio: Option<AudioParams>,
    pub video: Option<VideoParams>,
}

impl CodecParameters {
    pub fn audio(codec: impl Into<String>, params: AudioParams) -> Self {
        Self {
            kind: StreamKind::Audio,
            codec: codec.into(),
            bit_rate: 0,
            time_base: (1, 1_000),
            start_time_ms: 0,
            duration_ms: 0,
            frame_count: 0,
            audio: Some(params),
            video: None,
        }
    }

    pub fn video(codec: impl Into<String>, params: VideoParams) -> Self {
        Self {
            kind: StreamKind::Video,
            codec: codec.into(),
            bit_rate: 0,
            time_base: (1, 1_000),
            start_time_ms: 0,
            duration_ms: 0,
            frame_count: 0,
            audio: None,
            video: Some(params),
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.video.as_ref().map(|v| v.frame_rate).unwrap_or(0.0)
    }
}

/// Demultiplexer collaborator.
///
/// Implementations own the container parsing and the reader loop; the
/// orchestrator only asks about streams and flips the active one. Packet
/// delivery happens outside this trait: the reader pushes into the pipeline
/// packet queues handed to it by the player.
pub trait MediaSource: Send {
    /// Number of selectable streams of the given kind.
    fn stream_count(&self, kind: StreamKind) -> usize;

    /// Index of the currently active stream of the given kind, if any.
    fn active_stream(&self, kind: StreamKind) -> Option<usize>;

    /// Switch the active stream. Index has been validated by the caller.
    fn set_active_stream(&mut self, kind: StreamKind, index: usize);

    /// Codec parameters of the active stream, or `None` when the source has
    /// no stream of that kind.
    fn codec_parameters(&self, kind: StreamKind) -> Option<CodecParameters>;

    /// Container format name, e.g. "matroska".
    fn container_format(&self) -> String;

    fn bit_rate(&self) -> u64;

    fn start_time_ms(&self) -> i64;

    /// Total duration in milliseconds, 0 when unknown.
    fn duration_ms(&self) -> i64;

    /// Container-level frame rate guess, 0.0 when unknown.
    fn frame_rate(&self) -> f64;

    /// Container-level metadata tags.
    fn metadata(&self) -> HashMap<String, String>;
}
