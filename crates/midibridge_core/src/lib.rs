//! Host bridge core library
//!
//! This crate translates between polyphonic control voltages and timestamped
//! MIDI message streams, in both directions, one audio sample at a time.
//! It is a pure library: message transport, plugin hosting and UI live in the
//! surrounding host layer and talk to this crate through [`types::BlockInput`],
//! [`types::MessageSink`] and [`map::Destination`].
//!
//! Everything on the per-sample path works on fixed-capacity storage, so
//! steady-state processing never allocates or locks.

pub mod dsp;
pub mod map;
pub mod midi;
pub mod poly;
pub mod relay;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use poly::{PORT_MAX_CHANNELS, PolyVoltage};
pub use types::{BlockInput, MessageSink, MidiMessage, Status, TimestampedMessage, Transport};

/// Per-sample processing arguments handed down by the host engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessArgs {
    pub sample_rate: f32,
    pub sample_time: f32,
}

impl ProcessArgs {
    pub fn new(sample_rate: f32) -> Self {
        let sample_rate = sample_rate.max(1.0);
        Self {
            sample_rate,
            sample_time: 1.0 / sample_rate,
        }
    }
}

impl Default for ProcessArgs {
    fn default() -> Self {
        Self::new(48_000.0)
    }
}
