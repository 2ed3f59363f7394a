//! Compressed packet flowing demuxer -> queue -> decoder.

use crate::source::StreamKind;

/// One compressed frame from the demultiplexer.
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: StreamKind,
    pub stream_index: u32,
    pub pts_us: Option<i64>,
    pub dts_us: Option<i64>,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(kind: StreamKind, stream_index: u32, data: Vec<u8>) -> Self {
        Self {
            kind,
            stream_index,
            pts_us: None,
            dts_us: None,
            keyframe: false,
            data,
        }
    }

    pub fn with_pts(mut self, pts_us: i64) -> Self {
        self.pts_us = Some(pts_us);
        self
    }

    /// Best-effort timestamp: PTS when present, else DTS, else 0.
    pub fn timestamp_us(&self) -> i64 {
        self.pts_us.or(self.dts_us).unwrap_or(0)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
