//! Top-level playback orchestration.
//!
//! `PlayerCore` owns the clock, both stream pipelines, the audio device and
//! the statistics snapshot, and performs the setup/reset sequence on every
//! track selection: pause the owning pipeline, drain its queue, re-resolve
//! codec parameters, pick a working decoder, negotiate the audio output
//! format, resize queue thresholds and resume. Failure to bring up one
//! stream kind never aborts the other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::audio_output::{
    create_output, negotiate_output_format, AudioOutputFactory,
};
use crate::clock::{ClockMode, PlaybackClock};
use crate::decoder::{
    select_decoder, BuildCapabilities, DecodeError, DecoderFactory, DecoderOptions,
};
use crate::events::{EventHub, PlayerEvent};
use crate::frame::{FrameFilter, OutputSet};
use crate::packet_queue::QueueConfig;
use crate::pipeline::{SharedAudioOutput, StreamPipeline};
use crate::source::{MediaSource, StreamKind};
use crate::stats::StatisticsSnapshot;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no working {} decoder", .0.label())]
    DecoderNotFound(StreamKind),
    #[error("no {} track {index}", .kind.label())]
    NoSuchTrack { kind: StreamKind, index: usize },
    #[error("audio device open failed")]
    DeviceOpenFailed,
}

/// Construction-time wiring for [`PlayerCore`].
pub struct PlayerBuilder {
    source: Box<dyn MediaSource>,
    capabilities: BuildCapabilities,
    decoder_factories: Vec<Arc<dyn DecoderFactory>>,
    output_factories: Vec<Arc<dyn AudioOutputFactory>>,
    audio_filters: Vec<Arc<dyn FrameFilter>>,
    video_filters: Vec<Arc<dyn FrameFilter>>,
    video_outputs: Arc<OutputSet>,
    audio_options: DecoderOptions,
    video_options: DecoderOptions,
    audio_enabled: bool,
}

impl PlayerBuilder {
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        Self {
            source,
            capabilities: BuildCapabilities::host_defaults(),
            decoder_factories: Vec::new(),
            output_factories: Vec::new(),
            audio_filters: Vec::new(),
            video_filters: Vec::new(),
            video_outputs: Arc::new(OutputSet::new()),
            audio_options: DecoderOptions::new(),
            video_options: DecoderOptions::new(),
            audio_enabled: true,
        }
    }

    /// Enabled capability identifiers, in priority order. Defaults to
    /// everything this build ships with.
    pub fn capabilities(mut self, capabilities: BuildCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn register_decoder(mut self, factory: Arc<dyn DecoderFactory>) -> Self {
        self.decoder_factories.push(factory);
        self
    }

    pub fn register_audio_output(mut self, factory: Arc<dyn AudioOutputFactory>) -> Self {
        self.output_factories.push(factory);
        self
    }

    /// Filters applied between decode and render, passed in explicitly per
    /// stream kind rather than pulled from any global registry.
    pub fn filters(mut self, kind: StreamKind, filters: Vec<Arc<dyn FrameFilter>>) -> Self {
        match kind {
            StreamKind::Audio => self.audio_filters = filters,
            StreamKind::Video => self.video_filters = filters,
        }
        self
    }

    pub fn video_outputs(mut self, outputs: Arc<OutputSet>) -> Self {
        self.video_outputs = outputs;
        self
    }

    pub fn decoder_options(mut self, kind: StreamKind, options: DecoderOptions) -> Self {
        match kind {
            StreamKind::Audio => self.audio_options = options,
            StreamKind::Video => self.video_options = options,
        }
        self
    }

    pub fn audio_enabled(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn build(self) -> PlayerCore {
        let clock = Arc::new(PlaybackClock::new(ClockMode::AudioMaster));
        let decoder_candidates = self.capabilities.order_decoders(&self.decoder_factories);
        let output_candidates: Vec<Arc<dyn AudioOutputFactory>> = self
            .capabilities
            .audio_output_ids()
            .iter()
            .filter_map(|id| self.output_factories.iter().find(|f| f.id() == id).cloned())
            .collect();
        PlayerCore {
            audio: StreamPipeline::new(StreamKind::Audio, clock.clone()),
            video: StreamPipeline::new(StreamKind::Video, clock.clone()),
            source: self.source,
            clock,
            decoder_candidates,
            output_candidates,
            audio_filters: self.audio_filters,
            video_filters: self.video_filters,
            video_outputs: self.video_outputs,
            audio_options: self.audio_options,
            video_options: self.video_options,
            audio_enabled: self.audio_enabled,
            audio_output: Arc::new(Mutex::new(None)),
            audio_decoder_name: None,
            video_decoder_name: None,
            events: Arc::new(EventHub::new()),
            statistics: RwLock::new(Arc::new(StatisticsSnapshot::default())),
            notify_interval_ms: 500,
            speed: 1.0,
            muted: false,
        }
    }
}

/// The orchestrator.
pub struct PlayerCore {
    source: Box<dyn MediaSource>,
    clock: Arc<PlaybackClock>,
    audio: StreamPipeline,
    video: StreamPipeline,
    decoder_candidates: Vec<Arc<dyn DecoderFactory>>,
    output_candidates: Vec<Arc<dyn AudioOutputFactory>>,
    audio_filters: Vec<Arc<dyn FrameFilter>>,
    video_filters: Vec<Arc<dyn FrameFilter>>,
    video_outputs: Arc<OutputSet>,
    audio_options: DecoderOptions,
    video_options: DecoderOptions,
    audio_enabled: bool,
    /// The audio device persists across track changes unless it fails to
    /// reopen. Shared with the audio pipeline by reference, owned here.
    audio_output: SharedAudioOutput,
    audio_decoder_name: Option<String>,
    video_decoder_name: Option<String>,
    events: Arc<EventHub>,
    statistics: RwLock<Arc<StatisticsSnapshot>>,
    notify_interval_ms: u64,
    speed: f64,
    muted: bool,
}

impl PlayerCore {
    pub fn clock(&self) -> Arc<PlaybackClock> {
        self.clock.clone()
    }

    pub fn events(&self) -> Arc<EventHub> {
        self.events.clone()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Current snapshot. The snapshot is replaced atomically on every track
    /// change; the returned Arc stays internally consistent.
    pub fn statistics(&self) -> Arc<StatisticsSnapshot> {
        self.statistics.read().clone()
    }

    /// Progress-notification granularity for the current media, in ms.
    pub fn notify_interval_ms(&self) -> u64 {
        self.notify_interval_ms
    }

    /// Queue handed to the demuxer's reader for the given stream kind.
    pub fn packet_queue(&self, kind: StreamKind) -> Arc<crate::packet_queue::PacketQueue> {
        match kind {
            StreamKind::Audio => self.audio.queue(),
            StreamKind::Video => self.video.queue(),
        }
    }

    pub fn pipeline_state(&self, kind: StreamKind) -> crate::pipeline::PipelineState {
        match kind {
            StreamKind::Audio => self.audio.state(),
            StreamKind::Video => self.video.state(),
        }
    }

    /// Select the `index`-th stream of `kind` and rebuild that pipeline.
    ///
    /// An out-of-range index is rejected before any teardown happens. Any
    /// other failure leaves the stream kind cleanly disabled - previous
    /// decoder destroyed, queue cleared, snapshot refreshed - without
    /// touching the other kind.
    pub fn select_track(&mut self, kind: StreamKind, index: usize) -> Result<(), PlayerError> {
        if index >= self.source.stream_count(kind) {
            return Err(PlayerError::NoSuchTrack { kind, index });
        }
        let result = match kind {
            StreamKind::Audio => self.setup_audio_pipeline(index),
            StreamKind::Video => self.setup_video_pipeline(index),
        };
        self.refresh_statistics();
        result
    }

    /// Rebuild the whole statistics snapshot: container metadata plus both
    /// stream kinds. Called once after the source is opened and again on
    /// every track change.
    pub fn refresh_statistics(&mut self) {
        let snapshot = StatisticsSnapshot::build(
            self.source.as_ref(),
            self.audio_decoder_name.as_deref(),
            self.video_decoder_name.as_deref(),
        );
        self.notify_interval_ms =
            notify_interval(self.source.duration_ms(), self.source.frame_rate());
        debug!(notify_interval_ms = self.notify_interval_ms, "statistics refreshed");
        *self.statistics.write() = Arc::new(snapshot);
    }

    fn video_frame_rate(&self) -> f64 {
        let from_stream = self
            .source
            .codec_parameters(StreamKind::Video)
            .map(|p| p.frame_rate())
            .unwrap_or(0.0);
        if from_stream > 0.0 {
            from_stream
        } else {
            self.source.frame_rate()
        }
    }

    fn bind_decoder_errors(&self, decoder: &mut dyn crate::decoder::Decoder, kind: StreamKind) {
        let events = self.events.clone();
        decoder.set_error_callback(Arc::new(move |e: &DecodeError| {
            events.emit(PlayerEvent::DecodeError {
                kind,
                message: e.to_string(),
            });
        }));
    }

    fn setup_audio_pipeline(&mut self, track: usize) -> Result<(), PlayerError> {
        self.source.set_active_stream(StreamKind::Audio, track);

        // Pause, drain, detach. The old decoder's name feeds the statistics
        // refresh at the end of select_track; the instance dies here.
        let previous = self.audio.begin_reconfigure();
        drop(previous);

        let Some(mut params) = self.source.codec_parameters(StreamKind::Audio) else {
            self.audio_decoder_name = None;
            self.audio.disable();
            return Err(PlayerError::DecoderNotFound(StreamKind::Audio));
        };
        if let Some(audio) = params.audio.as_mut() {
            audio.correct_channels();
        }

        let mut decoder = match select_decoder(
            StreamKind::Audio,
            &params,
            &self.audio_options,
            &self.decoder_candidates,
        ) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(error = %e, "audio decoder selection failed");
                self.audio_decoder_name = None;
                self.audio.disable();
                self.events.emit(PlayerEvent::DecoderNotFound(StreamKind::Audio));
                return Err(PlayerError::DecoderNotFound(StreamKind::Audio));
            }
        };
        self.bind_decoder_errors(decoder.as_mut(), StreamKind::Audio);
        self.audio_decoder_name = Some(decoder.name().to_string());

        // Device negotiation. The device outlives track changes; it is only
        // reopened when the negotiated format actually differs.
        let mut device_failed = false;
        {
            let mut device = self.audio_output.lock();
            if device.is_none() && self.audio_enabled {
                *device = create_output(&self.output_candidates);
            }
            match (device.as_mut(), params.audio.as_ref()) {
                (Some(output), Some(audio)) => {
                    match negotiate_output_format(output.as_mut(), audio) {
                        Ok(outcome) => {
                            self.clock.set_sample_rate(outcome.format.sample_rate);
                            if self.clock.mode() != ClockMode::AudioMaster {
                                self.clock.set_mode(ClockMode::AudioMaster);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "disabling audio output");
                            *device = None;
                            device_failed = true;
                        }
                    }
                }
                _ => {
                    // No device (or audio disabled): pace against wall time.
                    self.clock.set_mode(ClockMode::External);
                }
            }
        }
        if device_failed {
            self.events.emit(PlayerEvent::DeviceOpenFailed);
            self.clock.set_mode(ClockMode::External);
        }

        self.audio.set_audio_output(Some(self.audio_output.clone()));
        self.audio.install(
            decoder,
            self.audio_filters.clone(),
            QueueConfig::for_frame_rate(self.video_frame_rate()),
        );

        if device_failed {
            // Playback continues under the free-running clock; the caller
            // still learns the device is gone.
            return Err(PlayerError::DeviceOpenFailed);
        }
        Ok(())
    }

    fn setup_video_pipeline(&mut self, track: usize) -> Result<(), PlayerError> {
        self.source.set_active_stream(StreamKind::Video, track);

        let previous = self.video.begin_reconfigure();
        drop(previous);

        let Some(params) = self.source.codec_parameters(StreamKind::Video) else {
            self.video_decoder_name = None;
            self.video.disable();
            return Err(PlayerError::DecoderNotFound(StreamKind::Video));
        };

        let mut decoder = match select_decoder(
            StreamKind::Video,
            &params,
            &self.video_options,
            &self.decoder_candidates,
        ) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(error = %e, "video decoder selection failed");
                self.video_decoder_name = None;
                self.video.disable();
                self.events.emit(PlayerEvent::DecoderNotFound(StreamKind::Video));
                return Err(PlayerError::DecoderNotFound(StreamKind::Video));
            }
        };
        self.bind_decoder_errors(decoder.as_mut(), StreamKind::Video);
        self.video_decoder_name = Some(decoder.name().to_string());

        self.video.set_video_output(Some(self.video_outputs.clone()));
        let queue_config = QueueConfig::for_frame_rate(params.frame_rate());
        self.video.install(decoder, self.video_filters.clone(), queue_config);

        // Audio buffering is sized relative to video cadence; a new video
        // cadence means the audio queue gets re-sized too.
        self.audio.queue().set_config(queue_config);
        Ok(())
    }

    /// Start/stop the shared clock (playback pause control).
    pub fn set_running(&self, running: bool) {
        self.clock.set_running(running);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Playback speed. Stored for renderers to consult; no resampling here.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(0.01, 100.0);
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Release everything in reverse-dependency order: workers first, then
    /// decoders, then the audio device.
    pub fn shutdown(&mut self) {
        self.audio.teardown();
        self.video.teardown();
        if let Some(mut output) = self.audio_output.lock().take() {
            output.close();
        }
        self.video_outputs.clear();
        self.clock.reset();
    }
}

impl Drop for PlayerCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Progress-notification granularity in milliseconds.
///
/// Short media wants fine-grained progress; long media would only waste CPU
/// polling below half a second.
pub fn notify_interval(duration_ms: i64, frame_rate: f64) -> u64 {
    if duration_ms <= 0 || duration_ms > 60 * 1000 {
        return 500;
    }
    if duration_ms > 20 * 1000 {
        return 250;
    }
    let dt = if frame_rate > 1.0 {
        (250).min((500.0 * 2.0 / frame_rate) as i64)
    } else {
        duration_ms / 80
    };
    dt.max(20) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_format::{AudioFormat, ChannelLayout, SampleFormat};
    use crate::audio_output::{AudioOutput, AudioOutputError};
    use crate::decoder::{Decoder, DecoderErrorCallback};
    use crate::frame::{AudioFrame, DecodedFrame};
    use crate::packet::Packet;
    use crate::source::{AudioParams, CodecParameters, VideoParams};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct SourceState {
        audio_selected: Option<usize>,
        video_selected: Option<usize>,
    }

    struct FakeSource {
        audio_tracks: usize,
        video_tracks: usize,
        state: Arc<Mutex<SourceState>>,
        duration_ms: i64,
        frame_rate: f64,
    }

    impl FakeSource {
        fn new(audio_tracks: usize, video_tracks: usize) -> Self {
            Self {
                audio_tracks,
                video_tracks,
                state: Arc::new(Mutex::new(SourceState::default())),
                duration_ms: 90_000,
                frame_rate: 30.0,
            }
        }
    }

    impl MediaSource for FakeSource {
        fn stream_count(&self, kind: StreamKind) -> usize {
            match kind {
                StreamKind::Audio => self.audio_tracks,
                StreamKind::Video => self.video_tracks,
            }
        }
        fn active_stream(&self, kind: StreamKind) -> Option<usize> {
            let state = self.state.lock();
            match kind {
                StreamKind::Audio => state.audio_selected,
                StreamKind::Video => state.video_selected,
            }
        }
        fn set_active_stream(&mut self, kind: StreamKind, index: usize) {
            let mut state = self.state.lock();
            match kind {
                StreamKind::Audio => state.audio_selected = Some(index),
                StreamKind::Video => state.video_selected = Some(index),
            }
        }
        fn codec_parameters(&self, kind: StreamKind) -> Option<CodecParameters> {
            match kind {
                StreamKind::Audio if self.audio_tracks > 0 => Some(CodecParameters::audio(
                    "aac",
                    AudioParams {
                        sample_rate: 48_000,
                        sample_format: SampleFormat::F32,
                        channels: 2,
                        channel_layout: Some(ChannelLayout::Stereo),
                        block_align: 0,
                        frame_size: 1024,
                    },
                )),
                StreamKind::Video if self.video_tracks > 0 => Some(CodecParameters::video(
                    "h264",
                    VideoParams {
                        width: 1280,
                        height: 720,
                        coded_width: 1280,
                        coded_height: 720,
                        pixel_format: Some(crate::frame::PixelFormat::Nv12),
                        gop_size: 0,
                        frame_rate: self.frame_rate,
                    },
                )),
                _ => None,
            }
        }
        fn container_format(&self) -> String {
            "matroska".into()
        }
        fn bit_rate(&self) -> u64 {
            1_000_000
        }
        fn start_time_ms(&self) -> i64 {
            0
        }
        fn duration_ms(&self) -> i64 {
            self.duration_ms
        }
        fn frame_rate(&self) -> f64 {
            self.frame_rate
        }
        fn metadata(&self) -> HashMap<String, String> {
            HashMap::new()
        }
    }

    #[derive(Default)]
    struct DecoderCounters {
        constructed: AtomicUsize,
        dropped: AtomicUsize,
    }

    struct CountedDecoder {
        counters: Arc<DecoderCounters>,
        kind: StreamKind,
        name: String,
    }

    impl Drop for CountedDecoder {
        fn drop(&mut self) {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Decoder for CountedDecoder {
        fn kind(&self) -> StreamKind {
            self.kind
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
            Ok(())
        }
        fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, DecodeError> {
            Ok(vec![DecodedFrame::Audio(AudioFrame {
                pts_us: packet.timestamp_us(),
                format: AudioFormat::new(48_000, SampleFormat::F32, ChannelLayout::Stereo),
                samples: vec![0.0; 64],
            })])
        }
        fn flush(&mut self) -> Result<Vec<DecodedFrame>, DecodeError> {
            Ok(vec![])
        }
        fn set_error_callback(&mut self, _callback: DecoderErrorCallback) {}
    }

    struct CountedFactory {
        id: String,
        kind: StreamKind,
        counters: Arc<DecoderCounters>,
    }

    impl DecoderFactory for CountedFactory {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> StreamKind {
            self.kind
        }
        fn create(&self) -> Option<Box<dyn Decoder>> {
            self.counters.constructed.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(CountedDecoder {
                counters: self.counters.clone(),
                kind: self.kind,
                name: self.id.clone(),
            }))
        }
    }

    struct FlakyOutput {
        fail_open: Arc<AtomicBool>,
        open_calls: Arc<AtomicUsize>,
        current: Option<AudioFormat>,
        staged: Option<AudioFormat>,
    }

    impl AudioOutput for FlakyOutput {
        fn name(&self) -> &str {
            "flaky"
        }
        fn is_supported(&self, _format: &AudioFormat) -> bool {
            true
        }
        fn is_sample_format_supported(&self, _format: SampleFormat) -> bool {
            true
        }
        fn is_channel_layout_supported(&self, _layout: ChannelLayout) -> bool {
            true
        }
        fn preferred_sample_format(&self) -> SampleFormat {
            SampleFormat::F32
        }
        fn preferred_channel_layout(&self) -> ChannelLayout {
            ChannelLayout::Stereo
        }
        fn current_format(&self) -> Option<AudioFormat> {
            self.current
        }
        fn set_format(&mut self, format: AudioFormat) {
            self.staged = Some(format);
        }
        fn open(&mut self) -> Result<(), AudioOutputError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_open.load(Ordering::SeqCst) {
                Err(AudioOutputError::OpenFailed("device busy".into()))
            } else {
                self.current = self.staged;
                Ok(())
            }
        }
        fn close(&mut self) {
            self.current = None;
        }
        fn write(&mut self, samples: &[f32]) -> usize {
            samples.len()
        }
    }

    struct FlakyOutputFactory {
        fail_open: Arc<AtomicBool>,
        open_calls: Arc<AtomicUsize>,
    }

    impl AudioOutputFactory for FlakyOutputFactory {
        fn id(&self) -> &str {
            "fake-out"
        }
        fn create(&self) -> Option<Box<dyn AudioOutput>> {
            Some(Box::new(FlakyOutput {
                fail_open: self.fail_open.clone(),
                open_calls: self.open_calls.clone(),
                current: None,
                staged: None,
            }))
        }
    }

    struct TestRig {
        player: PlayerCore,
        audio_counters: Arc<DecoderCounters>,
        video_counters: Arc<DecoderCounters>,
        fail_open: Arc<AtomicBool>,
        open_calls: Arc<AtomicUsize>,
        events: Arc<Mutex<Vec<PlayerEvent>>>,
    }

    fn rig(audio_tracks: usize, video_tracks: usize) -> TestRig {
        let audio_counters = Arc::new(DecoderCounters::default());
        let video_counters = Arc::new(DecoderCounters::default());
        let fail_open = Arc::new(AtomicBool::new(false));
        let open_calls = Arc::new(AtomicUsize::new(0));

        let caps = BuildCapabilities::new(["fake-audio", "fake-video"], ["fake-out"]);
        let player = PlayerBuilder::new(Box::new(FakeSource::new(audio_tracks, video_tracks)))
            .capabilities(caps)
            .register_decoder(Arc::new(CountedFactory {
                id: "fake-audio".into(),
                kind: StreamKind::Audio,
                counters: audio_counters.clone(),
            }))
            .register_decoder(Arc::new(CountedFactory {
                id: "fake-video".into(),
                kind: StreamKind::Video,
                counters: video_counters.clone(),
            }))
            .register_audio_output(Arc::new(FlakyOutputFactory {
                fail_open: fail_open.clone(),
                open_calls: open_calls.clone(),
            }))
            .build();

        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = events.clone();
            player.subscribe(move |event| events.lock().push(event.clone()));
        }
        TestRig {
            player,
            audio_counters,
            video_counters,
            fail_open,
            open_calls,
            events,
        }
    }

    // ------------------------------------------------------------------
    // notify_interval
    // ------------------------------------------------------------------

    #[test]
    fn test_notify_interval_table() {
        assert_eq!(notify_interval(0, 0.0), 500);
        assert_eq!(notify_interval(-1, 30.0), 500);
        assert_eq!(notify_interval(3_600_000, 30.0), 500);
        assert_eq!(notify_interval(5_000, 0.0), 62); // 5000/80
        assert_eq!(notify_interval(15_000, 30.0), 33); // min(250, 1000/30)
        assert_eq!(notify_interval(1_000, 0.5), 20); // 1000/80 clamped up
    }

    #[test]
    fn test_notify_interval_boundaries() {
        // Exactly 60s is not "long media".
        assert_eq!(notify_interval(60_000, 30.0), 250);
        assert_eq!(notify_interval(60_001, 30.0), 500);
        // Exactly 20s falls through to the fps branch.
        assert_eq!(notify_interval(20_000, 30.0), 33);
        assert_eq!(notify_interval(20_001, 30.0), 250);
    }

    // ------------------------------------------------------------------
    // Track selection
    // ------------------------------------------------------------------

    #[test]
    fn test_no_such_track_rejected_up_front() {
        let mut rig = rig(1, 1);
        rig.player.select_track(StreamKind::Audio, 0).unwrap();
        let before = rig.player.statistics();

        let err = rig.player.select_track(StreamKind::Audio, 5).unwrap_err();
        assert!(matches!(
            err,
            PlayerError::NoSuchTrack {
                kind: StreamKind::Audio,
                index: 5
            }
        ));
        // No teardown happened: pipeline still active, decoder still alive,
        // snapshot untouched.
        assert!(rig.player.audio.has_decoder());
        assert_eq!(rig.audio_counters.dropped.load(Ordering::SeqCst), 0);
        assert_eq!(*before, *rig.player.statistics());
    }

    #[test]
    fn test_reselection_replaces_decoder_without_leak() {
        let mut rig = rig(1, 0);
        rig.player.select_track(StreamKind::Audio, 0).unwrap();
        assert_eq!(rig.audio_counters.constructed.load(Ordering::SeqCst), 1);
        assert_eq!(rig.audio_counters.dropped.load(Ordering::SeqCst), 0);

        rig.player.select_track(StreamKind::Audio, 0).unwrap();
        // One new instance, the previous one destroyed.
        assert_eq!(rig.audio_counters.constructed.load(Ordering::SeqCst), 2);
        assert_eq!(rig.audio_counters.dropped.load(Ordering::SeqCst), 1);

        rig.player.shutdown();
        assert_eq!(rig.audio_counters.dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_decoder_not_found_disables_kind_only() {
        let audio_counters = Arc::new(DecoderCounters::default());
        // No video decoder registered at all.
        let caps = BuildCapabilities::new(["fake-audio"], Vec::<String>::new());
        let mut player = PlayerBuilder::new(Box::new(FakeSource::new(1, 1)))
            .capabilities(caps)
            .register_decoder(Arc::new(CountedFactory {
                id: "fake-audio".into(),
                kind: StreamKind::Audio,
                counters: audio_counters.clone(),
            }))
            .build();
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = events.clone();
            player.subscribe(move |event| events.lock().push(event.clone()));
        }

        player.select_track(StreamKind::Audio, 0).unwrap();
        let err = player.select_track(StreamKind::Video, 0).unwrap_err();
        assert!(matches!(err, PlayerError::DecoderNotFound(StreamKind::Video)));

        // Exactly one event for the whole failed selection.
        let seen = events.lock();
        let not_found: Vec<_> = seen
            .iter()
            .filter(|e| matches!(e, PlayerEvent::DecoderNotFound(StreamKind::Video)))
            .collect();
        assert_eq!(not_found.len(), 1);
        drop(seen);

        // Video disabled, audio untouched. The stream itself still shows up
        // in the snapshot (the container has it), but with no decoder name.
        assert!(!player.video.has_decoder());
        assert!(player.audio.has_decoder());
        let stats = player.statistics();
        assert!(stats.audio.available);
        assert!(stats.video.available);
        assert_eq!(stats.video.decoder, "");
    }

    #[test]
    fn test_device_open_failure_keeps_playing_free_running() {
        let mut rig = rig(1, 0);
        rig.fail_open.store(true, Ordering::SeqCst);

        let err = rig.player.select_track(StreamKind::Audio, 0).unwrap_err();
        assert!(matches!(err, PlayerError::DeviceOpenFailed));
        assert_eq!(rig.player.clock.mode(), ClockMode::External);
        // The decoder is installed and the pipeline is active regardless.
        assert!(rig.player.audio.has_decoder());
        assert!(rig
            .events
            .lock()
            .contains(&PlayerEvent::DeviceOpenFailed));
        // Device instance was destroyed.
        assert!(rig.player.audio_output.lock().is_none());
    }

    #[test]
    fn test_device_survives_track_changes_without_reopen() {
        let mut rig = rig(2, 0);
        rig.player.select_track(StreamKind::Audio, 0).unwrap();
        let opens_after_first = rig.open_calls.load(Ordering::SeqCst);
        assert_eq!(opens_after_first, 1);

        // Same format on the second track: negotiation must not reopen.
        rig.player.select_track(StreamKind::Audio, 1).unwrap();
        assert_eq!(rig.open_calls.load(Ordering::SeqCst), opens_after_first);
    }

    #[test]
    fn test_queue_sized_from_video_cadence() {
        let mut rig = rig(1, 1);
        rig.player.select_track(StreamKind::Video, 0).unwrap();
        let expected = QueueConfig::for_frame_rate(30.0);
        assert_eq!(rig.player.video.queue().config(), expected);
        // Audio queue follows video cadence.
        assert_eq!(rig.player.audio.queue().config(), expected);
    }

    #[test]
    fn test_audio_only_source_sizes_from_container_rate() {
        let mut rig = rig(1, 0);
        rig.player.select_track(StreamKind::Audio, 0).unwrap();
        // No video stream: sizing falls back to the container-level rate.
        assert_eq!(
            rig.player.audio.queue().config(),
            QueueConfig::for_frame_rate(30.0)
        );
    }

    #[test]
    fn test_statistics_rebuilt_on_selection() {
        let mut rig = rig(1, 1);
        assert!(!rig.player.statistics().audio.available);

        rig.player.select_track(StreamKind::Audio, 0).unwrap();
        let stats = rig.player.statistics();
        assert!(stats.audio.available);
        assert_eq!(stats.audio.decoder, "fake-audio");
        assert_eq!(stats.audio_only.sample_rate, 48_000);

        rig.player.select_track(StreamKind::Video, 0).unwrap();
        let stats = rig.player.statistics();
        assert!(stats.video.available);
        assert_eq!(stats.video.decoder, "fake-video");
        assert_eq!(stats.video_only.width, 1280);
    }

    #[test]
    fn test_video_counters_unused_in_audio_only_rig() {
        let mut rig = rig(1, 0);
        rig.player.select_track(StreamKind::Audio, 0).unwrap();
        assert_eq!(rig.video_counters.constructed.load(Ordering::SeqCst), 0);
    }
}
