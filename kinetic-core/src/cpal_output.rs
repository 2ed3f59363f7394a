//! cpal audio output backend.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
//! that builds it, starts it and then parks until told to stop. Decoded
//! samples cross over through a ringbuf; the device callback drains it and
//! substitutes silence on underrun. Open success or failure is reported back
//! over a one-shot channel before `open` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use tracing::{debug, warn};

use crate::audio_format::{AudioFormat, ChannelLayout, SampleFormat};
use crate::audio_output::{AudioOutput, AudioOutputError, AudioOutputFactory};

// Ring buffer capacity, in seconds of interleaved samples.
const BUFFER_SECONDS: usize = 2;

struct StreamThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct CpalAudioOutput {
    device_name: String,
    staged: Option<AudioFormat>,
    current: Option<AudioFormat>,
    producer: Option<HeapProd<f32>>,
    muted: Arc<AtomicBool>,
    stream: Option<StreamThread>,
}

impl CpalAudioOutput {
    fn new(device_name: String) -> Self {
        Self {
            device_name,
            staged: None,
            current: None,
            producer: None,
            muted: Arc::new(AtomicBool::new(false)),
            stream: None,
        }
    }

    /// Shared mute flag, applied inside the device callback.
    pub fn mute_flag(&self) -> Arc<AtomicBool> {
        self.muted.clone()
    }

    fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.stop_tx.send(());
            let _ = stream.handle.join();
        }
        self.producer = None;
    }
}

impl AudioOutput for CpalAudioOutput {
    fn name(&self) -> &str {
        &self.device_name
    }

    fn is_supported(&self, format: &AudioFormat) -> bool {
        self.is_sample_format_supported(format.sample_format)
            && self.is_channel_layout_supported(format.channel_layout)
    }

    fn is_sample_format_supported(&self, format: SampleFormat) -> bool {
        // The ringbuf carries interleaved f32; everything else is converted
        // before it reaches this backend.
        format == SampleFormat::F32
    }

    fn is_channel_layout_supported(&self, layout: ChannelLayout) -> bool {
        matches!(layout, ChannelLayout::Mono | ChannelLayout::Stereo)
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
        let Some(format) = self.staged else {
            return Err(AudioOutputError::OpenFailed("no format staged".into()));
        };
        self.stop_stream();

        let channels = format.channels() as usize;
        let ring = HeapRb::<f32>::new(format.sample_rate as usize * channels * BUFFER_SECONDS);
        let (producer, mut consumer) = ring.split();

        let muted = self.muted.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let Some(device) = cpal::default_host().default_output_device() else {
                let _ = ready_tx.send(Err("no default output device".into()));
                return;
            };
            let config = StreamConfig {
                channels: format.channels(),
                sample_rate: SampleRate(format.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let muted = muted.load(Ordering::Relaxed);
                    for sample in data.iter_mut() {
                        let s = consumer.try_pop().unwrap_or(0.0);
                        *sample = if muted { 0.0 } else { s };
                    }
                },
                |err| warn!(error = %err, "audio stream error"),
                None,
            );
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            // Hold the stream alive until close.
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!(?format, "cpal output opened");
                self.producer = Some(producer);
                self.stream = Some(StreamThread { stop_tx, handle });
                self.current = Some(format);
                Ok(())
            }
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(AudioOutputError::OpenFailed(message))
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioOutputError::OpenFailed("stream thread died".into()))
            }
        }
    }

    fn close(&mut self) {
        self.stop_stream();
        self.current = None;
    }

    fn write(&mut self, samples: &[f32]) -> usize {
        let Some(producer) = self.producer.as_mut() else {
            return 0;
        };
        let mut written = 0;
        for &sample in samples {
            // Back off briefly on a full ring instead of dropping audio; the
            // callback drains it at the device rate.
            let mut pushed = producer.try_push(sample).is_ok();
            if !pushed {
                thread::sleep(Duration::from_micros(500));
                pushed = producer.try_push(sample).is_ok();
            }
            if !pushed {
                break;
            }
            written += 1;
        }
        written
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

/// Factory for the default cpal output device.
pub struct CpalOutputFactory;

impl AudioOutputFactory for CpalOutputFactory {
    fn id(&self) -> &str {
        "cpal"
    }

    fn create(&self) -> Option<Box<dyn AudioOutput>> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let name = device.name().unwrap_or_else(|_| "default".into());
        Some(Box::new(CpalAudioOutput::new(name)))
    }
}
