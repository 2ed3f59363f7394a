//! Decoder interface and ordered-fallback selection.
//!
//! Decoder implementations live outside this crate (hardware backends, the
//! bundled symphonia candidate, test fakes). This module defines the
//! contract they implement and the selector that walks an ordered candidate
//! list until one implementation constructs *and* opens against the stream's
//! codec parameters.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::DecodedFrame;
use crate::packet::Packet;
use crate::source::{CodecParameters, StreamKind};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no {} decoder opened (tried: {tried:?})", .kind.label())]
    NoDecoder { kind: StreamKind, tried: Vec<String> },
    #[error("decoder open failed: {0}")]
    OpenFailed(String),
    #[error("invalid codec parameters: {0}")]
    InvalidParameters(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

/// Implementation-specific options attached before open.
pub type DecoderOptions = HashMap<String, String>;

/// Callback wired from a freshly opened decoder back to the player's
/// error-reporting channel. Bound once, before the first decode.
pub type DecoderErrorCallback = Arc<dyn Fn(&DecodeError) + Send + Sync>;

/// One decoder implementation instance.
pub trait Decoder: Send {
    fn kind(&self) -> StreamKind;

    fn name(&self) -> &str;

    fn set_codec_parameters(&mut self, params: &CodecParameters);

    fn set_options(&mut self, options: &DecoderOptions);

    /// Validate parameters and allocate whatever open needs.
    fn prepare(&mut self) -> Result<(), DecodeError>;

    /// Open against the attached codec parameters.
    fn open(&mut self) -> Result<(), DecodeError>;

    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError>;

    /// Drain internally buffered frames.
    fn flush(&mut self) -> Result<Vec<DecodedFrame>, DecodeError>;

    fn set_error_callback(&mut self, callback: DecoderErrorCallback);
}

impl std::fmt::Debug for dyn Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("name", &self.name())
            .finish()
    }
}

/// Constructs instances of one decoder implementation.
pub trait DecoderFactory: Send + Sync {
    /// Stable identifier used in the candidate list ("symphonia", "nvdec", ...).
    fn id(&self) -> &str;

    fn kind(&self) -> StreamKind;

    /// Construct an instance, or `None` when the implementation is not
    /// usable on this system.
    fn create(&self) -> Option<Box<dyn Decoder>>;
}

/// Capability identifiers enabled for this process, built once at startup.
///
/// This replaces compile-time feature scatter: the candidate order is plain
/// runtime data, so an excluded implementation behaves exactly like one that
/// failed to open.
#[derive(Debug, Clone, Default)]
pub struct BuildCapabilities {
    decoders: Vec<String>,
    audio_outputs: Vec<String>,
}

impl BuildCapabilities {
    pub fn new(
        decoders: impl IntoIterator<Item = impl Into<String>>,
        audio_outputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            decoders: decoders.into_iter().map(Into::into).collect(),
            audio_outputs: audio_outputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Everything this build ships with, in priority order.
    pub fn host_defaults() -> Self {
        let mut decoders: Vec<String> = Vec::new();
        let mut audio_outputs: Vec<String> = Vec::new();
        #[cfg(feature = "software-audio-decode")]
        decoders.push("symphonia".into());
        #[cfg(feature = "audio-backend")]
        audio_outputs.push("cpal".into());
        Self {
            decoders,
            audio_outputs,
        }
    }

    pub fn decoder_ids(&self) -> &[String] {
        &self.decoders
    }

    pub fn audio_output_ids(&self) -> &[String] {
        &self.audio_outputs
    }

    /// Order registered factories by the enabled-id list, dropping anything
    /// not enabled.
    pub fn order_decoders(
        &self,
        registered: &[Arc<dyn DecoderFactory>],
    ) -> Vec<Arc<dyn DecoderFactory>> {
        self.decoders
            .iter()
            .filter_map(|id| registered.iter().find(|f| f.id() == id).cloned())
            .collect()
    }
}

/// Try candidates in order; first implementation that constructs, prepares
/// and opens wins. Failed instances are dropped on the spot. An empty
/// candidate list behaves identically to all candidates failing.
pub fn select_decoder(
    kind: StreamKind,
    params: &CodecParameters,
    options: &DecoderOptions,
    candidates: &[Arc<dyn DecoderFactory>],
) -> Result<Box<dyn Decoder>, DecodeError> {
    let mut tried = Vec::new();
    for factory in candidates.iter().filter(|f| f.kind() == kind) {
        tried.push(factory.id().to_string());
        debug!(id = factory.id(), kind = kind.label(), "trying decoder");
        let Some(mut decoder) = factory.create() else {
            continue;
        };
        decoder.set_codec_parameters(params);
        decoder.set_options(options);
        match decoder.prepare().and_then(|_| decoder.open()) {
            Ok(()) => {
                debug!(id = factory.id(), "decoder opened");
                return Ok(decoder);
            }
            Err(e) => {
                warn!(id = factory.id(), error = %e, "decoder rejected stream");
                // instance dropped here
            }
        }
    }
    Err(DecodeError::NoDecoder { kind, tried })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        constructed: AtomicUsize,
        dropped: AtomicUsize,
    }

    struct FakeDecoder {
        open_ok: bool,
        counters: Arc<Counters>,
        name: String,
    }

    impl Drop for FakeDecoder {
        fn drop(&mut self) {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Decoder for FakeDecoder {
        fn kind(&self) -> StreamKind {
            StreamKind::Video
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn set_codec_parameters(&mut self, _params: &CodecParameters) {}
        fn set_options(&mut self, _options: &DecoderOptions) {}
        fn prepare(&mut self) -> Result<(), DecodeError> {
            Ok(())
        }
        fn open(&mut self) -> Result<(), DecodeError> {
            if self.open_ok {
                Ok(())
            } else {
                Err(DecodeError::OpenFailed("nope".into()))
            }
        }
        fn decode(&mut self, _packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError> {
            Ok(vec![])
        }
        fn flush(&mut self) -> Result<Vec<DecodedFrame>, DecodeError> {
            Ok(vec![])
        }
        fn set_error_callback(&mut self, _callback: DecoderErrorCallback) {}
    }

    struct FakeFactory {
        id: String,
        open_ok: bool,
        counters: Arc<Counters>,
    }

    impl DecoderFactory for FakeFactory {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> StreamKind {
            StreamKind::Video
        }
        fn create(&self) -> Option<Box<dyn Decoder>> {
            self.counters.constructed.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(FakeDecoder {
                open_ok: self.open_ok,
                counters: self.counters.clone(),
                name: self.id.clone(),
            }))
        }
    }

    fn factory(id: &str, open_ok: bool) -> (Arc<dyn DecoderFactory>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let f = Arc::new(FakeFactory {
            id: id.into(),
            open_ok,
            counters: counters.clone(),
        });
        (f, counters)
    }

    fn params() -> CodecParameters {
        CodecParameters::video(
            "h264",
            crate::source::VideoParams {
                width: 640,
                height: 480,
                coded_width: 640,
                coded_height: 480,
                pixel_format: None,
                gop_size: 0,
                frame_rate: 30.0,
            },
        )
    }

    #[test]
    fn test_first_working_candidate_wins() {
        let (a, a_counters) = factory("a", false);
        let (b, b_counters) = factory("b", true);
        let (c, c_counters) = factory("c", true);
        let result = select_decoder(
            StreamKind::Video,
            &params(),
            &DecoderOptions::new(),
            &[a, b, c],
        )
        .unwrap();
        assert_eq!(result.name(), "b");
        // A was constructed and destroyed; C was never constructed.
        assert_eq!(a_counters.constructed.load(Ordering::SeqCst), 1);
        assert_eq!(a_counters.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(b_counters.dropped.load(Ordering::SeqCst), 0);
        assert_eq!(c_counters.constructed.load(Ordering::SeqCst), 0);
        drop(result);
        assert_eq!(b_counters.dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_candidate_list_fails() {
        let err = select_decoder(StreamKind::Video, &params(), &DecoderOptions::new(), &[])
            .unwrap_err();
        match err {
            DecodeError::NoDecoder { kind, tried } => {
                assert_eq!(kind, StreamKind::Video);
                assert!(tried.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_all_failing_candidates_report_tried() {
        let (a, _) = factory("a", false);
        let (b, _) = factory("b", false);
        let err = select_decoder(StreamKind::Video, &params(), &DecoderOptions::new(), &[a, b])
            .unwrap_err();
        match err {
            DecodeError::NoDecoder { tried, .. } => assert_eq!(tried, vec!["a", "b"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_capabilities_order_and_exclusion() {
        let (a, _) = factory("a", true);
        let (b, _) = factory("b", true);
        let caps = BuildCapabilities::new(["b", "a", "missing"], Vec::<String>::new());
        let ordered = caps.order_decoders(&[a, b]);
        let ids: Vec<_> = ordered.iter().map(|f| f.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
