//! Audio output interface and format negotiation.
//!
//! The negotiator reconciles the decoded stream's native format against what
//! the device actually accepts, reopening the device only when the resulting
//! format differs from the one it is currently configured for. Running it
//! twice with no format change performs no reopen.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::audio_format::{AudioFormat, ChannelLayout, SampleFormat};
use crate::source::AudioParams;

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("audio device open failed: {0}")]
    OpenFailed(String),
    #[error("no audio output device available")]
    NoDevice,
}

/// Audio sink collaborator. At most one instance persists across track
/// changes unless it fails to reopen.
pub trait AudioOutput: Send {
    fn name(&self) -> &str;

    /// Whole-format support check.
    fn is_supported(&self, format: &AudioFormat) -> bool;

    fn is_sample_format_supported(&self, format: SampleFormat) -> bool;

    fn is_channel_layout_supported(&self, layout: ChannelLayout) -> bool;

    fn preferred_sample_format(&self) -> SampleFormat;

    fn preferred_channel_layout(&self) -> ChannelLayout;

    /// Format the device is currently opened with, if any.
    fn current_format(&self) -> Option<AudioFormat>;

    /// Stage a format for the next `open`.
    fn set_format(&mut self, format: AudioFormat);

    fn open(&mut self) -> Result<(), AudioOutputError>;

    fn close(&mut self);

    /// Queue interleaved f32 samples for playback. Returns the number of
    /// samples accepted.
    fn write(&mut self, samples: &[f32]) -> usize;
}

/// Constructs one audio output backend, tried in candidate order.
pub trait AudioOutputFactory: Send + Sync {
    fn id(&self) -> &str;

    /// Construct a device instance, or `None` when the backend cannot run
    /// on this system.
    fn create(&self) -> Option<Box<dyn AudioOutput>>;
}

/// Walk the candidate list and return the first backend that constructs.
pub fn create_output(candidates: &[Arc<dyn AudioOutputFactory>]) -> Option<Box<dyn AudioOutput>> {
    for factory in candidates {
        debug!(id = factory.id(), "trying audio output");
        if let Some(output) = factory.create() {
            debug!(id = factory.id(), "audio output found");
            return Some(output);
        }
    }
    None
}

/// Result of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOutcome {
    pub format: AudioFormat,
    /// Whether the device was actually closed and reopened.
    pub reopened: bool,
}

/// Reconcile the stream's native format against the device.
///
/// On reopen failure the caller must destroy the device instance and fall
/// back to a free-running clock; this function only reports the failure.
pub fn negotiate_output_format(
    output: &mut dyn AudioOutput,
    params: &AudioParams,
) -> Result<NegotiationOutcome, AudioOutputError> {
    let mut format = AudioFormat::new(
        params.sample_rate,
        params.sample_format,
        // Multichannel streams get the device's preferred layout; some
        // devices mishandle 5/6/7-channel passthrough.
        if params.channels > 2 {
            output.preferred_channel_layout()
        } else {
            params
                .channel_layout
                .or_else(|| ChannelLayout::default_for(params.channels))
                .unwrap_or_else(|| output.preferred_channel_layout())
        },
    );

    // Planar conversion is not handled by this layer.
    if format.is_planar() {
        format.sample_format = output.preferred_sample_format();
    }

    if !output.is_supported(&format) {
        if !output.is_sample_format_supported(format.sample_format) {
            format.sample_format = output.preferred_sample_format();
        }
        if !output.is_channel_layout_supported(format.channel_layout) {
            format.channel_layout = output.preferred_channel_layout();
        }
    }

    if output.current_format() == Some(format) {
        return Ok(NegotiationOutcome {
            format,
            reopened: false,
        });
    }

    debug!(?format, "audio format changed, reopening output");
    output.close();
    output.set_format(format);
    if let Err(e) = output.open() {
        warn!(error = %e, "audio output reopen failed");
        return Err(e);
    }
    Ok(NegotiationOutcome {
        format,
        reopened: true,
    })
}
