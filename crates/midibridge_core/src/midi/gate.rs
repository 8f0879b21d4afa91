//! Notes to gates and back, one learned note per cell.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FULL_SCALE_VOLTS;
use super::cursor::MessageCursor;
use super::outbound::{DEFAULT_VELOCITY, GATE_THRESHOLD, OutboundConfig, OutboundTranslator};
use crate::ProcessArgs;
use crate::dsp::utils::{midi_to_volts, volts_to_midi};
use crate::dsp::{PulseGenerator, TRIGGER_PULSE_SECONDS};
use crate::poly::{PORT_MAX_CHANNELS, PolyVoltage};
use crate::state::{PersistedState, clamp_channel_filter};
use crate::types::{BlockInput, MessageSink, MidiMessage, TimestampedMessage};

pub const GATE_CELLS: usize = 16;

/// 4x4 drum pad layout starting at note 36, bottom row first.
fn default_notes() -> [Option<u8>; GATE_CELLS] {
    std::array::from_fn(|i| {
        let (x, y) = (i % 4, i / 4);
        Some((36 + 4 * (3 - y) + x) as u8)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct GateConfig {
    /// Note number per cell (None = unassigned)
    pub notes: [Option<u8>; GATE_CELLS],
    /// Gate outputs carry velocity, and cell inputs set velocity
    pub velocity_mode: bool,
    /// One output channel per MIDI channel
    pub mpe: bool,
    /// MIDI channel filter (1-16, 0 = all channels)
    pub input_channel: u8,
    /// MIDI channel (0-15) for emitted notes
    pub output_channel: u8,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            notes: default_notes(),
            velocity_mode: false,
            mpe: false,
            input_channel: 0,
            output_channel: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct GateState {
    #[serde(flatten)]
    pub config: GateConfig,
}

impl PersistedState for GateState {
    const KIND: &'static str = "gate";
}

#[derive(Debug, Clone)]
pub struct GateConverter {
    config: GateConfig,
    cursor: MessageCursor,
    /// Cell waiting for its note, if any
    learning: Option<usize>,

    /// [cell][channel]
    gates: [[bool; PORT_MAX_CHANNELS]; GATE_CELLS],
    pulses: [[PulseGenerator; PORT_MAX_CHANNELS]; GATE_CELLS],
    velocities: [[u8; PORT_MAX_CHANNELS]; GATE_CELLS],

    outbound: OutboundTranslator,
    outputs: [PolyVoltage; GATE_CELLS],
}

impl Default for GateConverter {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl GateConverter {
    pub fn new(config: GateConfig) -> Self {
        let config = GateConfig {
            notes: config.notes.map(|n| n.map(|n| n & 0x7F)),
            input_channel: clamp_channel_filter(config.input_channel),
            output_channel: config.output_channel & 0x0F,
            ..config
        };
        Self {
            config,
            cursor: MessageCursor::new(),
            learning: None,
            gates: [[false; PORT_MAX_CHANNELS]; GATE_CELLS],
            pulses: [[PulseGenerator::new(); PORT_MAX_CHANNELS]; GATE_CELLS],
            velocities: [[0; PORT_MAX_CHANNELS]; GATE_CELLS],
            outbound: OutboundTranslator::new(OutboundConfig {
                output_channel: config.output_channel,
                mpe: false,
            }),
            outputs: [PolyVoltage::default(); GATE_CELLS],
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Capture the next note-on into `cell`.
    pub fn enable_learn(&mut self, cell: usize) {
        if cell < GATE_CELLS {
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

    pub fn set_note(&mut self, cell: usize, note: Option<u8>) {
        if let Some(slot) = self.config.notes.get_mut(cell) {
            *slot = note.map(|n| n & 0x7F);
        }
    }

    pub fn set_velocity_mode(&mut self, enabled: bool) {
        self.config.velocity_mode = enabled;
    }

    pub fn set_mpe(&mut self, mpe: bool) {
        if mpe != self.config.mpe {
            self.config.mpe = mpe;
            self.clear_gates();
        }
    }

    pub fn set_input_channel(&mut self, filter: u8) {
        self.config.input_channel = clamp_channel_filter(filter);
    }

    pub fn set_output_channel(&mut self, channel: u8, sink: &mut impl MessageSink) {
        self.config.output_channel = channel & 0x0F;
        self.outbound.set_output_channel(channel, sink);
    }

    pub fn outputs(&self) -> &[PolyVoltage; GATE_CELLS] {
        &self.outputs
    }

    /// One sample: play back due messages, update gate outputs, then turn
    /// `cells` into note-on/off edges.
    pub fn process(
        &mut self,
        args: &ProcessArgs,
        input: BlockInput<'_>,
        cells: &[f32; GATE_CELLS],
        sink: &mut impl MessageSink,
    ) -> &[PolyVoltage; GATE_CELLS] {
        profiling::scope!("gate_process");

        let block_changed = self.cursor.sync(&input);
        while let Some(event) = self.cursor.pop_due() {
            self.handle_message(&event);
        }
        self.cursor.advance();
        self.update_outputs(args.sample_time);

        self.outbound.advance_frame(block_changed);
        let channel = self.config.output_channel;
        for (cell, &volts) in cells.iter().enumerate() {
            let Some(note) = self.config.notes[cell] else {
                continue;
            };
            if self.config.velocity_mode {
                let velocity = volts_to_midi(volts, FULL_SCALE_VOLTS);
                self.outbound.set_velocity(channel, note, velocity);
                self.outbound.set_gate(channel, note, velocity > 0, sink);
            } else {
                self.outbound.set_velocity(channel, note, DEFAULT_VELOCITY);
                self.outbound.set_gate(channel, note, volts >= GATE_THRESHOLD, sink);
            }
        }

        &self.outputs
    }

    pub fn handle_message(&mut self, message: &TimestampedMessage) {
        if !message.passes_channel_filter(self.config.input_channel) {
            return;
        }
        match message.parse() {
            Some(MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            }) if velocity > 0 => {
                if let Some(cell) = self.learning.take() {
                    tracing::debug!(cell, note, "gate cell learned note");
                    self.config.notes[cell] = Some(note);
                }
                let c = self.voice_channel(channel);
                for cell in self.cells_for(note) {
                    self.gates[cell][c] = true;
                    self.pulses[cell][c].trigger(TRIGGER_PULSE_SECONDS);
                    self.velocities[cell][c] = velocity;
                }
            }
            Some(MidiMessage::NoteOn { channel, note, .. })
            | Some(MidiMessage::NoteOff { channel, note, .. }) => {
                let c = self.voice_channel(channel);
                for cell in self.cells_for(note) {
                    self.gates[cell][c] = false;
                }
            }
            _ => {}
        }
    }

    fn voice_channel(&self, channel: u8) -> usize {
        if self.config.mpe { (channel & 0x0F) as usize } else { 0 }
    }

    fn cells_for(&self, note: u8) -> impl Iterator<Item = usize> + use<> {
        let notes = self.config.notes;
        (0..GATE_CELLS).filter(move |&cell| notes[cell] == Some(note))
    }

    fn update_outputs(&mut self, dt: f32) {
        let channels = if self.config.mpe { PORT_MAX_CHANNELS } else { 1 };
        for cell in 0..GATE_CELLS {
            let output = &mut self.outputs[cell];
            output.set_channels(channels);
            for c in 0..channels {
                // gates stay high for at least one trigger pulse
                let pulsing = self.pulses[cell][c].process(dt);
                let volts = if self.gates[cell][c] || pulsing {
                    if self.config.velocity_mode {
                        midi_to_volts(self.velocities[cell][c], FULL_SCALE_VOLTS)
                    } else {
                        FULL_SCALE_VOLTS
                    }
                } else {
                    0.0
                };
                output.set(c, volts);
            }
        }
    }

    fn clear_gates(&mut self) {
        self.gates = [[false; PORT_MAX_CHANNELS]; GATE_CELLS];
        for pulse in self.pulses.iter_mut().flatten() {
            pulse.reset();
        }
    }

    /// Close every gate and release every note sent.
    pub fn panic(&mut self, sink: &mut impl MessageSink) {
        self.clear_gates();
        self.outbound.panic(sink);
    }

    /// Drop pending input and edge memory. Learned notes are kept.
    pub fn reset(&mut self) {
        self.cursor.reset();
        self.learning = None;
        self.clear_gates();
        self.outbound.reset();
    }

    pub fn save_state(&self) -> GateState {
        GateState {
            config: self.config,
        }
    }

    pub fn load_state(&mut self, state: &GateState) {
        tracing::debug!(?state, "restoring gate state");
        *self = Self::new(state.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    const IDLE: [f32; GATE_CELLS] = [0.0; GATE_CELLS];

    #[test]
    fn test_default_grid() {
        let notes = GateConfig::default().notes;
        assert_eq!(notes[0], Some(48));
        assert_eq!(notes[3], Some(51));
        assert_eq!(notes[12], Some(36));
        assert_eq!(notes[15], Some(39));
    }

    #[test]
    fn test_short_note_still_pulses() {
        let args = ProcessArgs::default();
        let mut gate = GateConverter::default();
        let batch = [
            TimestampedMessage::note_on(0, 0, 36, 100),
            TimestampedMessage::note_off(0, 0, 36, 0),
        ];
        let out = gate.process(&args, BlockInput::new(1, &batch), &IDLE, &mut Vec::new());
        assert_eq!(out[12].get(0), 10.0);
        for _ in 0..60 {
            gate.process(&args, BlockInput::new(1, &batch), &IDLE, &mut Vec::new());
        }
        assert_eq!(gate.outputs()[12].get(0), 0.0);
    }

    #[test]
    fn test_velocity_mode_output() {
        let args = ProcessArgs::default();
        let mut gate = GateConverter::default();
        gate.set_velocity_mode(true);
        let batch = [TimestampedMessage::note_on(0, 0, 48, 127)];
        let out = gate.process(&args, BlockInput::new(1, &batch), &IDLE, &mut Vec::new());
        assert!((out[0].get(0) - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_learn_captures_next_note() {
        let args = ProcessArgs::default();
        let mut gate = GateConverter::default();
        gate.enable_learn(2);
        let batch = [TimestampedMessage::note_on(0, 0, 70, 100)];
        gate.process(&args, BlockInput::new(1, &batch), &IDLE, &mut Vec::new());
        assert_eq!(gate.config().notes[2], Some(70));
        assert_eq!(gate.learning(), None);
        assert_eq!(gate.outputs()[2].get(0), 10.0);
    }

    #[test]
    fn test_cell_inputs_send_edges() {
        let args = ProcessArgs::default();
        let mut gate = GateConverter::default();
        let mut sink = Vec::new();
        let mut cells = IDLE;
        cells[12] = 5.0;
        for _ in 0..10 {
            gate.process(&args, BlockInput::new(1, &[]), &cells, &mut sink);
        }
        cells[12] = 0.0;
        gate.process(&args, BlockInput::new(1, &[]), &cells, &mut sink);
        let statuses: Vec<_> = sink.iter().filter_map(|m| m.status()).collect();
        assert_eq!(statuses, vec![Status::NoteOn, Status::NoteOff]);
        assert_eq!(sink[0].bytes(), &[0x90, 36, DEFAULT_VELOCITY]);
    }

    #[test]
    fn test_mpe_spreads_channels() {
        let args = ProcessArgs::default();
        let mut gate = GateConverter::default();
        gate.set_mpe(true);
        let batch = [TimestampedMessage::note_on(0, 4, 48, 100)];
        let out = gate.process(&args, BlockInput::new(1, &batch), &IDLE, &mut Vec::new());
        assert_eq!(out[0].channels(), 16);
        assert_eq!(out[0].get(4), 10.0);
        assert_eq!(out[0].get(0), 0.0);
    }

    #[test]
    fn test_state_keeps_unassigned_cells() {
        let mut gate = GateConverter::default();
        gate.set_note(5, None);
        let json = gate.save_state().to_json().unwrap();
        assert!(json["notes"][5].is_null());
        let state = GateState::from_json(&json).unwrap();
        assert_eq!(state.config.notes[5], None);
        assert_eq!(state.config.notes[0], Some(48));
    }
}
