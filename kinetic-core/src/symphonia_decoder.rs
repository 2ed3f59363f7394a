//! Software audio decoder candidate over symphonia.
//!
//! Registered last in the candidate order so hardware implementations get
//! first refusal. Frames come out as interleaved f32 regardless of what the
//! codec produced.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    CodecParameters as SymphoniaParameters, CodecType, DecoderOptions as SymphoniaOptions,
    CODEC_TYPE_AAC, CODEC_TYPE_ALAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_OPUS,
    CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_VORBIS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet as SymphoniaPacket;
use tracing::debug;

use crate::audio_format::{AudioFormat, ChannelLayout, SampleFormat};
use crate::decoder::{
    DecodeError, Decoder, DecoderErrorCallback, DecoderFactory, DecoderOptions,
};
use crate::frame::{AudioFrame, DecodedFrame};
use crate::packet::Packet;
use crate::source::{CodecParameters, StreamKind};

/// Map a short codec name onto symphonia's registry key.
fn codec_type_for(codec: &str) -> Option<CodecType> {
    match codec {
        "aac" => Some(CODEC_TYPE_AAC),
        "mp3" => Some(CODEC_TYPE_MP3),
        "flac" => Some(CODEC_TYPE_FLAC),
        "vorbis" => Some(CODEC_TYPE_VORBIS),
        "opus" => Some(CODEC_TYPE_OPUS),
        "alac" => Some(CODEC_TYPE_ALAC),
        "pcm_s16le" => Some(CODEC_TYPE_PCM_S16LE),
        "pcm_f32le" => Some(CODEC_TYPE_PCM_F32LE),
        _ => None,
    }
}

fn symphonia_layout(layout: ChannelLayout) -> Option<symphonia::core::audio::Layout> {
    use symphonia::core::audio::Layout;
    match layout {
        ChannelLayout::Mono => Some(Layout::Mono),
        ChannelLayout::Stereo => Some(Layout::Stereo),
        ChannelLayout::Surround51 => Some(Layout::FivePointOne),
        _ => None,
    }
}

pub struct SymphoniaAudioDecoder {
    params: Option<CodecParameters>,
    inner: Option<Box<dyn symphonia::core::codecs::Decoder>>,
    sample_buf: Option<SampleBuffer<f32>>,
    output_format: Option<AudioFormat>,
    error_callback: Option<DecoderErrorCallback>,
}

impl SymphoniaAudioDecoder {
    pub fn new() -> Self {
        Self {
            params: None,
            inner: None,
            sample_buf: None,
            output_format: None,
            error_callback: None,
        }
    }

    fn report(&self, error: &DecodeError) {
        if let Some(callback) = &self.error_callback {
            callback(error);
        }
    }
}

impl Default for SymphoniaAudioDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SymphoniaAudioDecoder {
    fn kind(&self) -> StreamKind {
        StreamKind::Audio
    }

    fn name(&self) -> &str {
        "symphonia"
    }

    fn set_codec_parameters(&mut self, params: &CodecParameters) {
        self.params = Some(params.clone());
    }

    fn set_options(&mut self, _options: &DecoderOptions) {}

    fn prepare(&mut self) -> Result<(), DecodeError> {
        let Some(params) = &self.params else {
            return Err(DecodeError::InvalidParameters("no codec parameters".into()));
        };
        let Some(audio) = &params.audio else {
            return Err(DecodeError::InvalidParameters("not an audio stream".into()));
        };
        if audio.sample_rate == 0 {
            return Err(DecodeError::InvalidParameters("sample rate unknown".into()));
        }
        if codec_type_for(&params.codec).is_none() {
            return Err(DecodeError::InvalidParameters(format!(
                "unsupported codec {}",
                params.codec
            )));
        }
        Ok(())
    }

    fn open(&mut self) -> Result<(), DecodeError> {
        let Some(params) = &self.params else {
            return Err(DecodeError::InvalidParameters("no codec parameters".into()));
        };
        let audio = params
            .audio
            .as_ref()
            .ok_or_else(|| DecodeError::InvalidParameters("not an audio stream".into()))?;
        let codec_type = codec_type_for(&params.codec).ok_or_else(|| {
            DecodeError::InvalidParameters(format!("unsupported codec {}", params.codec))
        })?;

        let mut sym_params = SymphoniaParameters::new();
        sym_params
            .for_codec(codec_type)
            .with_sample_rate(audio.sample_rate);
        if let Some(layout) = audio.channel_layout.and_then(symphonia_layout) {
            sym_params.with_channel_layout(layout);
        }

        let inner = symphonia::default::get_codecs()
            .make(&sym_params, &SymphoniaOptions::default())
            .map_err(|e| DecodeError::OpenFailed(e.to_string()))?;

        debug!(codec = %params.codec, sample_rate = audio.sample_rate, "symphonia decoder opened");
        self.output_format = Some(AudioFormat::new(
            audio.sample_rate,
            SampleFormat::F32,
            audio.channel_layout.unwrap_or(ChannelLayout::Stereo),
        ));
        self.inner = Some(inner);
        self.sample_buf = None;
        Ok(())
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(DecodeError::DecodeFailed("decoder not open".into()));
        };
        let sym_packet =
            SymphoniaPacket::new_from_slice(0, packet.timestamp_us().max(0) as u64, 0, &packet.data);
        let decoded = match inner.decode(&sym_packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(message)) => {
                // Corrupt packet; skip it and keep the stream alive.
                let error = DecodeError::DecodeFailed(message.to_string());
                self.report(&error);
                return Ok(vec![]);
            }
            Err(e) => return Err(DecodeError::DecodeFailed(e.to_string())),
        };

        if self.sample_buf.is_none() {
            let spec = *decoded.spec();
            self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = self.sample_buf.as_mut() else {
            return Ok(vec![]);
        };
        buf.copy_interleaved_ref(decoded);

        let Some(format) = self.output_format else {
            return Err(DecodeError::DecodeFailed("decoder not open".into()));
        };
        Ok(vec![DecodedFrame::Audio(AudioFrame {
            pts_us: packet.timestamp_us(),
            format,
            samples: buf.samples().to_vec(),
        })])
    }

    fn flush(&mut self) -> Result<Vec<DecodedFrame>, DecodeError> {
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
        Ok(vec![])
    }

    fn set_error_callback(&mut self, callback: DecoderErrorCallback) {
        self.error_callback = Some(callback);
    }
}

pub struct SymphoniaDecoderFactory;

impl DecoderFactory for SymphoniaDecoderFactory {
    fn id(&self) -> &str {
        "symphonia"
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Audio
    }

    fn create(&self) -> Option<Box<dyn Decoder>> {
        Some(Box::new(SymphoniaAudioDecoder::new()))
    }
}
