//! Playback statistics snapshot.
//!
//! A derived, read-only description of the active streams. The snapshot is
//! rebuilt wholesale whenever a stream is (re)selected and swapped in as one
//! unit; readers always see either the old or the new record, never a mix.
//! A stream kind with no available codec gets a zeroed record, not a stale
//! one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::source::{CodecParameters, MediaSource, StreamKind};

/// Fields common to both stream kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    pub available: bool,
    pub codec: String,
    /// Name of the decoder implementation serving this stream.
    pub decoder: String,
    pub bit_rate: u64,
    pub start_time_ms: i64,
    pub total_time_ms: i64,
    pub frames: u64,
}

impl StreamStatistics {
    fn from_params(params: &CodecParameters, decoder: Option<&str>) -> Self {
        Self {
            available: true,
            codec: params.codec.clone(),
            decoder: decoder.unwrap_or_default().to_string(),
            bit_rate: params.bit_rate,
            start_time_ms: params.start_time_ms,
            total_time_ms: params.duration_ms,
            frames: params.frame_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStatistics {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: String,
    pub sample_format: String,
    pub block_align: u32,
    pub frame_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoStatistics {
    pub width: u32,
    pub height: u32,
    pub coded_width: u32,
    pub coded_height: u32,
    pub pixel_format: String,
    pub gop_size: u32,
    pub frame_rate: f64,
}

/// Full snapshot: container-level metadata plus one record per stream kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub format: String,
    pub bit_rate: u64,
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub metadata: HashMap<String, String>,
    pub audio: StreamStatistics,
    pub audio_only: AudioStatistics,
    pub video: StreamStatistics,
    pub video_only: VideoStatistics,
}

impl StatisticsSnapshot {
    /// Build a fresh snapshot from the source and the active decoders.
    pub fn build(
        source: &dyn MediaSource,
        audio_decoder: Option<&str>,
        video_decoder: Option<&str>,
    ) -> Self {
        let mut snapshot = Self {
            format: source.container_format(),
            bit_rate: source.bit_rate(),
            start_time_ms: source.start_time_ms(),
            duration_ms: source.duration_ms(),
            metadata: source.metadata(),
            ..Default::default()
        };
        snapshot.set_audio(source.codec_parameters(StreamKind::Audio).as_ref(), audio_decoder);
        snapshot.set_video(source.codec_parameters(StreamKind::Video).as_ref(), video_decoder);
        snapshot
    }

    fn set_audio(&mut self, params: Option<&CodecParameters>, decoder: Option<&str>) {
        let Some(params) = params else {
            self.audio = StreamStatistics::default();
            self.audio_only = AudioStatistics::default();
            return;
        };
        self.audio = StreamStatistics::from_params(params, decoder);
        self.audio_only = match &params.audio {
            Some(a) => AudioStatistics {
                sample_rate: a.sample_rate,
                channels: a.channels,
                channel_layout: a
                    .channel_layout
                    .map(|l| l.name().to_string())
                    .unwrap_or_default(),
                sample_format: a.sample_format.name().to_string(),
                block_align: a.block_align,
                frame_size: a.frame_size,
            },
            None => AudioStatistics::default(),
        };
    }

    fn set_video(&mut self, params: Option<&CodecParameters>, decoder: Option<&str>) {
        let Some(params) = params else {
            self.video = StreamStatistics::default();
            self.video_only = VideoStatistics::default();
            return;
        };
        self.video = StreamStatistics::from_params(params, decoder);
        self.video_only = match &params.video {
            Some(v) => VideoStatistics {
                width: v.width,
                height: v.height,
                coded_width: v.coded_width,
                coded_height: v.coded_height,
                pixel_format: v
                    .pixel_format
                    .map(|f| f.name().to_string())
                    .unwrap_or_default(),
                gop_size: v.gop_size,
                frame_rate: v.frame_rate,
            },
            None => VideoStatistics::default(),
        };
    }
}
