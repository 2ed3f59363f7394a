//! Audio format descriptors.
//!
//! `AudioFormat` is compared structurally: two descriptors with the same
//! sample rate, sample format and channel layout are the same format, which
//! is what drives the "reopen the device only if something changed" logic in
//! the output negotiator.

use serde::{Deserialize, Serialize};

/// Sample format of decoded audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
    // Planar variants (one buffer per channel)
    U8P,
    S16P,
    S32P,
    F32P,
    F64P,
}

impl SampleFormat {
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            Self::U8P | Self::S16P | Self::S32P | Self::F32P | Self::F64P
        )
    }

    /// Packed (interleaved) counterpart of this format.
    pub fn packed(&self) -> SampleFormat {
        match self {
            Self::U8P => Self::U8,
            Self::S16P => Self::S16,
            Self::S32P => Self::S32,
            Self::F32P => Self::F32,
            Self::F64P => Self::F64,
            other => *other,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 | Self::U8P => 1,
            Self::S16 | Self::S16P => 2,
            Self::S32 | Self::S32P | Self::F32 | Self::F32P => 4,
            Self::F64 | Self::F64P => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::U8P => "u8p",
            Self::S16P => "s16p",
            Self::S32P => "s32p",
            Self::F32P => "f32p",
            Self::F64P => "f64p",
        }
    }
}

/// Speaker arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Quad,
    Surround51,
    Surround71,
}

impl ChannelLayout {
    pub fn channels(&self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Quad => 4,
            Self::Surround51 => 6,
            Self::Surround71 => 8,
        }
    }

    /// Default layout for a raw channel count, if one exists.
    pub fn default_for(channels: u16) -> Option<ChannelLayout> {
        match channels {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            4 => Some(Self::Quad),
            6 => Some(Self::Surround51),
            8 => Some(Self::Surround71),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Stereo => "stereo",
            Self::Quad => "quad",
            Self::Surround51 => "5.1",
            Self::Surround71 => "7.1",
        }
    }
}

/// Complete output format description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channel_layout: ChannelLayout,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, sample_format: SampleFormat, channel_layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            sample_format,
            channel_layout,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channel_layout.channels()
    }

    pub fn is_planar(&self) -> bool {
        self.sample_format.is_planar()
    }

    /// Bytes consumed by one second of audio in this format.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels() as usize * self.sample_format.bytes_per_sample()
    }
}
