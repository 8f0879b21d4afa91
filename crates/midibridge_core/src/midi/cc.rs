//! Control changes to voltages and back, one learned CC per cell.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FULL_SCALE_VOLTS;
use super::cursor::MessageCursor;
use super::outbound::{OutboundConfig, OutboundTranslator};
use crate::ProcessArgs;
use crate::dsp::utils::volts_to_midi;
use crate::dsp::{ExponentialFilter, Timer};
use crate::poly::{PORT_MAX_CHANNELS, PolyVoltage};
use crate::state::{PersistedState, clamp_channel_filter};
use crate::types::{BlockInput, MessageSink, TimestampedMessage, raw_cc_value};

pub const CC_CELLS: usize = 16;

/// Outgoing CCs are sent at most this often.
pub const RATE_LIMIT_SECONDS: f32 = 1.0 / 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CcConfig {
    /// Controller number per cell
    pub ccs: [u8; CC_CELLS],
    /// Smooth outputs, jumping on button-like steps
    pub smooth: bool,
    /// One output channel per MIDI channel
    pub mpe: bool,
    /// Pair CC 0-31 with CC 32-63 as 14-bit values
    pub lsb_mode: bool,
    /// MIDI channel filter (1-16, 0 = all channels)
    pub input_channel: u8,
    /// MIDI channel (0-15) for emitted CCs
    pub output_channel: u8,
}

impl Default for CcConfig {
    fn default() -> Self {
        Self {
            ccs: std::array::from_fn(|i| i as u8),
            smooth: true,
            mpe: false,
            lsb_mode: false,
            input_channel: 0,
            output_channel: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CcState {
    #[serde(flatten)]
    pub config: CcConfig,
    /// Last value of every CC on channel 0, so outputs come back where they
    /// were without touching the controller
    pub values: Vec<i8>,
}

impl PersistedState for CcState {
    const KIND: &'static str = "cc";
}

#[derive(Debug, Clone)]
pub struct CcConverter {
    config: CcConfig,
    cursor: MessageCursor,
    learning: Option<usize>,

    /// [cc][channel], signed because some controllers send 8-bit values
    values: [[i8; PORT_MAX_CHANNELS]; 128],
    /// Pending MSB of CC 0-31 in LSB mode, [cc][channel]
    msb_values: [[i8; PORT_MAX_CHANNELS]; 32],
    /// [cell][channel]
    filters: [[ExponentialFilter; PORT_MAX_CHANNELS]; CC_CELLS],

    outbound: OutboundTranslator,
    rate_limiter: Timer,
    outputs: [PolyVoltage; CC_CELLS],
}

impl Default for CcConverter {
    fn default() -> Self {
        Self::new(CcConfig::default())
    }
}

impl CcConverter {
    pub fn new(config: CcConfig) -> Self {
        let config = CcConfig {
            ccs: config.ccs.map(|cc| cc & 0x7F),
            input_channel: clamp_channel_filter(config.input_channel),
            output_channel: config.output_channel & 0x0F,
            ..config
        };
        Self {
            config,
            cursor: MessageCursor::new(),
            learning: None,
            values: [[0; PORT_MAX_CHANNELS]; 128],
            msb_values: [[0; PORT_MAX_CHANNELS]; 32],
            filters: [[ExponentialFilter::default(); PORT_MAX_CHANNELS]; CC_CELLS],
            outbound: OutboundTranslator::new(OutboundConfig {
                output_channel: config.output_channel,
                mpe: false,
            }),
            rate_limiter: Timer::default(),
            outputs: [PolyVoltage::default(); CC_CELLS],
        }
    }

    pub fn config(&self) -> &CcConfig {
        &self.config
    }

    /// Capture the next CC whose value moves into `cell`.
    pub fn enable_learn(&mut self, cell: usize) {
        if cell < CC_CELLS {
            self.learning = Some(cell);
        }
    }

    pub fn disable_learn(&mut self, cell: usize) {
        if self.learning == Some(cell) {
            self.learning = None;
        }
    }

    pub fn learning(&self) -> Option<usize> {
        self.learning
    }

    pub fn set_cc(&mut self, cell: usize, cc: u8) {
        if let Some(slot) = self.config.ccs.get_mut(cell) {
            *slot = cc & 0x7F;
        }
    }

    pub fn set_smooth(&mut self, smooth: bool) {
        self.config.smooth = smooth;
    }

    pub fn set_mpe(&mut self, mpe: bool) {
        self.config.mpe = mpe;
    }

    pub fn set_lsb_mode(&mut self, enabled: bool) {
        self.config.lsb_mode = enabled;
    }

    pub fn set_input_channel(&mut self, filter: u8) {
        self.config.input_channel = clamp_channel_filter(filter);
    }

    pub fn set_output_channel(&mut self, channel: u8, sink: &mut impl MessageSink) {
        self.config.output_channel = channel & 0x0F;
        self.outbound.set_output_channel(channel, sink);
    }

    /// Raw stored value of `cc` on `channel`.
    pub fn value(&self, cc: u8, channel: usize) -> i8 {
        self.values[(cc & 0x7F) as usize][channel.min(PORT_MAX_CHANNELS - 1)]
    }

    pub fn outputs(&self) -> &[PolyVoltage; CC_CELLS] {
        &self.outputs
    }

    pub fn process(
        &mut self,
        args: &ProcessArgs,
        input: BlockInput<'_>,
        cells: &[f32; CC_CELLS],
        sink: &mut impl MessageSink,
    ) -> &[PolyVoltage; CC_CELLS] {
        profiling::scope!("cc_process");

        let block_changed = self.cursor.sync(&input);
        while let Some(event) = self.cursor.pop_due() {
            self.handle_message(&event);
        }
        self.cursor.advance();
        self.update_outputs(args.sample_time);

        self.outbound.advance_frame(block_changed);
        if self.rate_limiter.process(args.sample_time) >= RATE_LIMIT_SECONDS {
            self.rate_limiter.time -= RATE_LIMIT_SECONDS;
            for (cell, &volts) in cells.iter().enumerate() {
                let value = volts_to_midi(volts, FULL_SCALE_VOLTS);
                self.outbound.set_controller(self.config.ccs[cell], value, sink);
            }
        }

        &self.outputs
    }

    pub fn handle_message(&mut self, message: &TimestampedMessage) {
        if !message.passes_channel_filter(self.config.input_channel) {
            return;
        }
        let Some((channel, cc, value)) = raw_cc_value(message) else {
            return;
        };
        let c = if self.config.mpe { channel as usize } else { 0 };
        let cc = cc as usize;

        if let Some(cell) = self.learning {
            if self.values[cc][c] != value {
                tracing::debug!(cell, cc, "cc cell learned controller");
                self.config.ccs[cell] = cc as u8;
                self.learning = None;
            }
        }

        match cc {
            // hold the MSB until its LSB arrives
            0..32 if self.config.lsb_mode => self.msb_values[cc][c] = value,
            32..64 if self.config.lsb_mode => {
                self.values[cc - 32][c] = self.msb_values[cc - 32][c];
                self.values[cc][c] = value;
            }
            _ => self.values[cc][c] = value,
        }
    }

    fn cell_value(&self, cc: usize, c: usize) -> f32 {
        let mut raw = self.values[cc][c] as i16 * 128;
        if self.config.lsb_mode && cc < 32 {
            raw += self.values[cc + 32][c] as i16;
        }
        // MSB 127 with LSB 0 is full scale, matching 7-bit controllers
        (raw as f32 / (128.0 * 127.0)).clamp(-1.0, 1.0)
    }

    fn update_outputs(&mut self, dt: f32) {
        let channels = if self.config.mpe { PORT_MAX_CHANNELS } else { 1 };
        for cell in 0..CC_CELLS {
            let cc = self.config.ccs[cell] as usize;
            self.outputs[cell].set_channels(channels);
            for c in 0..channels {
                let value = self.cell_value(cc, c);
                let filter = &mut self.filters[cell][c];
                if self.config.smooth && (filter.out - value).abs() < 1.0 {
                    filter.process(dt, value);
                } else {
                    filter.snap(value);
                }
                self.outputs[cell].set(c, filter.out * FULL_SCALE_VOLTS);
            }
        }
    }

    /// Drop pending input, stored values and edge memory. Learned CCs are kept.
    pub fn reset(&mut self) {
        self.cursor.reset();
        self.learning = None;
        self.values = [[0; PORT_MAX_CHANNELS]; 128];
        self.msb_values = [[0; PORT_MAX_CHANNELS]; 32];
        for filter in self.filters.iter_mut().flatten() {
            filter.reset();
        }
        self.outbound.reset();
        self.rate_limiter.reset();
    }

    pub fn save_state(&self) -> CcState {
        CcState {
            config: self.config,
            values: self.values.iter().map(|row| row[0]).collect(),
        }
    }

    pub fn load_state(&mut self, state: &CcState) {
        tracing::debug!(config = ?state.config, "restoring cc state");
        *self = Self::new(state.config);
        for (cc, &value) in state.values.iter().take(128).enumerate() {
            self.values[cc][0] = value;
        }
        // outputs start at the restored values instead of ramping up
        for cell in 0..CC_CELLS {
            let value = self.cell_value(self.config.ccs[cell] as usize, 0);
            self.filters[cell][0].snap(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: [f32; CC_CELLS] = [0.0; CC_CELLS];

    fn cc(controller: u8, value: u8) -> TimestampedMessage {
        TimestampedMessage::control_change(0, 0, controller, value)
    }

    #[test]
    fn test_full_value_reaches_ten_volts() {
        let args = ProcessArgs::default();
        let mut conv = CcConverter::default();
        conv.set_smooth(false);
        let batch = [cc(3, 127)];
        let out = conv.process(&args, BlockInput::new(1, &batch), &IDLE, &mut Vec::new());
        assert!((out[3].get(0) - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_smoothing_jumps_on_full_swing() {
        let args = ProcessArgs::default();
        let mut conv = CcConverter::default();
        // 0 -> 1 is a full-scale step, treated as a button press
        let out = conv.process(&args, BlockInput::new(1, &[cc(0, 127)]), &IDLE, &mut Vec::new());
        assert!((out[0].get(0) - 10.0).abs() < 1e-5);

        let out = conv.process(&args, BlockInput::new(2, &[cc(0, 64)]), &IDLE, &mut Vec::new());
        let v = out[0].get(0);
        assert!(v < 10.0 && v > 5.0, "expected a ramp, got {v}");
    }

    #[test]
    fn test_lsb_mode_combines_pairs() {
        let args = ProcessArgs::default();
        let mut conv = CcConverter::default();
        conv.set_smooth(false);
        conv.set_lsb_mode(true);
        let batch = [cc(1, 64), cc(33, 64)];
        let out = conv.process(&args, BlockInput::new(1, &batch), &IDLE, &mut Vec::new());
        let expected = (64.0 * 128.0 + 64.0) / (128.0 * 127.0) * 10.0;
        assert!((out[1].get(0) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_msb_waits_for_lsb() {
        let mut conv = CcConverter::default();
        conv.set_lsb_mode(true);
        conv.handle_message(&cc(2, 100));
        assert_eq!(conv.value(2, 0), 0);
        conv.handle_message(&cc(34, 0));
        assert_eq!(conv.value(2, 0), 100);
    }

    #[test]
    fn test_learn_requires_value_change() {
        let mut conv = CcConverter::default();
        conv.enable_learn(0);
        conv.handle_message(&cc(20, 0));
        assert_eq!(conv.learning(), Some(0));
        conv.handle_message(&cc(20, 5));
        assert_eq!(conv.learning(), None);
        assert_eq!(conv.config().ccs[0], 20);
    }

    #[test]
    fn test_outgoing_ccs_are_rate_limited() {
        let args = ProcessArgs::default();
        let mut conv = CcConverter::default();
        let mut sink = Vec::new();
        let mut cells = IDLE;
        // a one second ramp changes the value far more often than 200 Hz
        for i in 0..48_000 {
            cells[0] = i as f32 / 4800.0;
            conv.process(&args, BlockInput::new(1, &[]), &cells, &mut sink);
        }
        let frames: Vec<u32> = sink
            .iter()
            .filter(|m| m.bytes()[1] == 0)
            .map(|m| m.frame)
            .collect();
        assert!(frames.len() > 50 && frames.len() <= 200, "sent {}", frames.len());
        assert!(frames.windows(2).all(|w| w[1] - w[0] >= 239));
    }

    #[test]
    fn test_state_restores_values() {
        let mut conv = CcConverter::default();
        conv.handle_message(&cc(7, 99));
        let json = conv.save_state().to_json().unwrap();
        assert_eq!(json["values"][7], 99);

        let mut restored = CcConverter::default();
        restored.load_state(&CcState::from_json(&json).unwrap());
        assert_eq!(restored.value(7, 0), 99);
    }
}
