//! Polyphonic voice allocation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::voice::VoiceBank;

/// Voice allocation mode for polyphonic operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PolyMode {
    /// Round-robin through available voices
    #[default]
    Rotate,
    /// Reuse the channel already holding the note before rotating
    Reuse,
    /// Always search from channel 0
    Reset,
    /// MIDI channel maps directly to output channel
    Mpe,
}

impl PolyMode {
    pub fn is_mpe(self) -> bool {
        self == PolyMode::Mpe
    }
}

/// Chooses the output channel for each note-on.
///
/// Only the rotate cursor lives here; voice state belongs to the
/// [`VoiceBank`] the caller passes in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceAllocator {
    /// Last channel handed out by rotation; `None` after a reset.
    rotate_index: Option<usize>,
}

impl VoiceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.rotate_index = None;
    }

    /// Pick a channel in `0..channels` for `note`.
    ///
    /// `mpe_channel` is the message's own MIDI channel and is only used in
    /// [`PolyMode::Mpe`]. With a single channel every mode returns 0.
    pub fn assign(
        &mut self,
        mode: PolyMode,
        note: u8,
        mpe_channel: u8,
        bank: &VoiceBank,
        channels: usize,
    ) -> usize {
        if mode == PolyMode::Mpe {
            return mpe_channel as usize & 0x0F;
        }
        let channels = channels.clamp(1, crate::PORT_MAX_CHANNELS);
        if channels == 1 {
            return 0;
        }

        let voices = &bank.voices()[..channels];
        match mode {
            PolyMode::Reuse => {
                // a channel that last played this note, sounding or not
                if let Some(c) = voices.iter().position(|v| v.note == note) {
                    return c;
                }
                self.rotate(bank, channels)
            }
            PolyMode::Reset => voices
                .iter()
                .position(|v| !v.gate)
                .unwrap_or(channels - 1),
            _ => self.rotate(bank, channels),
        }
    }

    /// Next free channel after the last one handed out. If every channel is
    /// busy, steal the one right after the last assignment.
    fn rotate(&mut self, bank: &VoiceBank, channels: usize) -> usize {
        let start = self.next_index(channels);
        for i in 0..channels {
            let c = (start + i) % channels;
            if !bank.voice(c).gate {
                self.rotate_index = Some(c);
                return c;
            }
        }
        self.rotate_index = Some(start);
        start
    }

    fn next_index(&self, channels: usize) -> usize {
        match self.rotate_index {
            Some(i) => (i + 1) % channels,
            None => 0,
        }
    }
}
