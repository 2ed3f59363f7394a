//! # Kinetic Core
//!
//! Media playback pipeline orchestrator: decoder selection with ordered
//! fallback, audio output negotiation, packet queue backpressure and A/V
//! synchronization over a shared clock.

// ============================================================================
// Source / Packets
// ============================================================================
pub mod packet;
pub mod packet_queue;
pub mod source;

// ============================================================================
// Decode
// ============================================================================
pub mod decoder;
pub mod frame;
#[cfg(feature = "software-audio-decode")]
pub mod symphonia_decoder;

// ============================================================================
// Audio Output
// ============================================================================
pub mod audio_format;
pub mod audio_output;
#[cfg(feature = "audio-backend")]
pub mod cpal_output;

// ============================================================================
// Playback
// ============================================================================
pub mod clock;
pub mod events;
pub mod pipeline;
pub mod player;
pub mod stats;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
