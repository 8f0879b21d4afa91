//! Polyphonic control voltages.
//!
//! A [`PolyVoltage`] carries up to 16 channel voltages plus the number of
//! channels that are semantically valid, the same convention a polyphonic
//! patch cable uses:
//! - 0 = disconnected
//! - 1 = monophonic
//! - 2-16 = polyphonic

/// Maximum channels per cable (matches the MIDI channel count)
pub const PORT_MAX_CHANNELS: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct PolyVoltage {
    /// Voltage values for each channel (always allocated, not all may be active)
    voltages: [f32; PORT_MAX_CHANNELS],
    /// Number of active channels: 0 = disconnected, 1 = mono, 2-16 = poly
    channels: usize,
}

impl Default for PolyVoltage {
    fn default() -> Self {
        Self {
            voltages: [0.0; PORT_MAX_CHANNELS],
            channels: 0,
        }
    }
}

impl PartialEq for PolyVoltage {
    fn eq(&self, other: &Self) -> bool {
        self.channels == other.channels
            && self.voltages[..self.channels] == other.voltages[..other.channels]
    }
}

impl PolyVoltage {
    /// Create a monophonic signal with a single value
    pub fn mono(value: f32) -> Self {
        let mut sig = Self::default();
        sig.voltages[0] = value;
        sig.channels = 1;
        sig
    }

    /// Create a signal with one channel per value (extra values are ignored)
    pub fn poly(values: &[f32]) -> Self {
        let mut sig = Self::default();
        let n = values.len().min(PORT_MAX_CHANNELS);
        sig.voltages[..n].copy_from_slice(&values[..n]);
        sig.channels = n;
        sig
    }

    /// Get voltage for a specific channel (returns 0.0 if out of range)
    pub fn get(&self, channel: usize) -> f32 {
        if channel < self.channels {
            self.voltages[channel]
        } else {
            0.0
        }
    }

    /// Polyphonic read: a mono signal applies to every channel.
    pub fn get_poly(&self, channel: usize) -> f32 {
        if self.channels == 1 {
            self.voltages[0]
        } else {
            self.get(channel)
        }
    }

    /// Like [`get_poly`](Self::get_poly), but a disconnected signal reads as
    /// `normal`.
    pub fn get_normal_poly(&self, channel: usize, normal: f32) -> f32 {
        if self.channels == 0 {
            normal
        } else {
            self.get_poly(channel)
        }
    }

    /// Set voltage for a specific channel
    pub fn set(&mut self, channel: usize, value: f32) {
        if channel < PORT_MAX_CHANNELS {
            self.voltages[channel] = value;
        }
    }

    /// Set the number of active channels (clears higher channels to 0)
    pub fn set_channels(&mut self, channels: usize) {
        let channels = channels.min(PORT_MAX_CHANNELS);
        for c in channels..self.channels {
            self.voltages[c] = 0.0;
        }
        self.channels = channels;
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_connected(&self) -> bool {
        self.channels > 0
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.voltages[..self.channels]
    }
}
