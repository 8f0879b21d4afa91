//! Per-channel performance state.

use crate::PORT_MAX_CHANNELS;
use crate::types::PITCH_WHEEL_CENTER;

/// State for a single voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    /// MIDI note number (0-127)
    pub note: u8,
    /// Gate state
    pub gate: bool,
    /// Velocity (0-127)
    pub velocity: u8,
    /// Key or channel pressure (0-127)
    pub aftertouch: u8,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            note: 60,
            gate: false,
            velocity: 0,
            aftertouch: 0,
        }
    }
}

/// Sixteen voices plus wheel state, indexed by channel.
///
/// Outside MPE mode only wheel slot 0 is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceBank {
    voices: [Voice; PORT_MAX_CHANNELS],
    pitch_wheels: [u16; PORT_MAX_CHANNELS],
    mod_wheels: [u8; PORT_MAX_CHANNELS],
}

impl Default for VoiceBank {
    fn default() -> Self {
        Self {
            voices: [Voice::default(); PORT_MAX_CHANNELS],
            pitch_wheels: [PITCH_WHEEL_CENTER; PORT_MAX_CHANNELS],
            mod_wheels: [0; PORT_MAX_CHANNELS],
        }
    }
}

impl VoiceBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voice(&self, channel: usize) -> &Voice {
        &self.voices[channel.min(PORT_MAX_CHANNELS - 1)]
    }

    pub fn voice_mut(&mut self, channel: usize) -> &mut Voice {
        &mut self.voices[channel.min(PORT_MAX_CHANNELS - 1)]
    }

    pub fn voices(&self) -> &[Voice; PORT_MAX_CHANNELS] {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut [Voice; PORT_MAX_CHANNELS] {
        &mut self.voices
    }

    pub fn pitch_wheel(&self, channel: usize) -> u16 {
        self.pitch_wheels[channel.min(PORT_MAX_CHANNELS - 1)]
    }

    pub fn set_pitch_wheel(&mut self, channel: usize, value: u16) {
        self.pitch_wheels[channel.min(PORT_MAX_CHANNELS - 1)] = value.min(0x3fff);
    }

    pub fn mod_wheel(&self, channel: usize) -> u8 {
        self.mod_wheels[channel.min(PORT_MAX_CHANNELS - 1)]
    }

    pub fn set_mod_wheel(&mut self, channel: usize, value: u8) {
        self.mod_wheels[channel.min(PORT_MAX_CHANNELS - 1)] = value.min(127);
    }

    /// Number of voices among the first `channels` with their gate high.
    pub fn gate_count(&self, channels: usize) -> usize {
        self.voices[..channels.min(PORT_MAX_CHANNELS)]
            .iter()
            .filter(|v| v.gate)
            .count()
    }

    /// First of the first `channels` voices sounding `note`.
    pub fn find_sounding(&self, note: u8, channels: usize) -> Option<usize> {
        self.voices[..channels.min(PORT_MAX_CHANNELS)]
            .iter()
            .position(|v| v.gate && v.note == note)
    }

    /// Silence every voice and recenter the wheels.
    pub fn panic(&mut self) {
        *self = Self::default();
    }
}
