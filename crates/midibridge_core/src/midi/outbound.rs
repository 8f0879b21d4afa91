//! CV to MIDI converter.
//!
//! Reads continuous per-channel voltages each sample and emits messages only
//! on gate edges and quantized value changes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FULL_SCALE_VOLTS;
use crate::dsp::SchmittTrigger;
use crate::dsp::utils::{volts_to_midi, volts_to_pitch_wheel, voct_to_note};
use crate::poly::{PORT_MAX_CHANNELS, PolyVoltage};
use crate::state::PersistedState;
use crate::types::{MessageSink, PITCH_WHEEL_CENTER, TimestampedMessage, Transport, cc};

/// Velocity sent when the velocity input is disconnected.
pub const DEFAULT_VELOCITY: u8 = 100;

/// Gates read high from 1V.
pub const GATE_THRESHOLD: f32 = 1.0;

/// Voltage a disconnected velocity input reads as.
const DEFAULT_VELOCITY_VOLTS: f32 = DEFAULT_VELOCITY as f32 / 127.0 * FULL_SCALE_VOLTS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct OutboundConfig {
    /// MIDI channel (0-15) for every emitted channel message outside MPE mode
    pub output_channel: u8,
    /// Send poly channel `c` on MIDI channel `c`, with per-channel wheels
    pub mpe: bool,
}

/// Persisted form of an [`OutboundTranslator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct OutboundState {
    #[serde(flatten)]
    pub config: OutboundConfig,
}

impl PersistedState for OutboundState {
    const KIND: &'static str = "outbound";
}

/// Voltages read each sample. Disconnected inputs have zero channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundInputs {
    /// 1V/octave, quantized to the nearest note
    pub pitch: PolyVoltage,
    /// High from 1V
    pub gate: PolyVoltage,
    /// 0-10V, defaults to velocity 100 when disconnected
    pub velocity: PolyVoltage,
    /// 0-10V
    pub aftertouch: PolyVoltage,
    /// -5V to +5V
    pub pitch_wheel: PolyVoltage,
    /// 0-10V
    pub mod_wheel: PolyVoltage,
    pub start: f32,
    pub stop: f32,
    pub cont: f32,
}

#[derive(Debug, Clone)]
pub struct OutboundTranslator {
    config: OutboundConfig,
    frame: u32,
    last_generation: Option<u64>,

    /// Edge memory per MIDI channel and note number
    last_gates: [[bool; 128]; PORT_MAX_CHANNELS],
    velocities: [[u8; 128]; PORT_MAX_CHANNELS],
    /// Poly channels currently holding each MIDI channel and note
    holders: [[u8; 128]; PORT_MAX_CHANNELS],

    /// Note and gate last sent for each poly channel
    channel_notes: [u8; PORT_MAX_CHANNELS],
    channel_gates: [bool; PORT_MAX_CHANNELS],

    pressures: [Option<u8>; PORT_MAX_CHANNELS],
    pitch_wheels: [u16; PORT_MAX_CHANNELS],
    mod_wheels: [Option<u8>; PORT_MAX_CHANNELS],
    controllers: [Option<u8>; 128],

    start_trigger: SchmittTrigger,
    stop_trigger: SchmittTrigger,
    continue_trigger: SchmittTrigger,

    dropped: u64,
}

impl Default for OutboundTranslator {
    fn default() -> Self {
        Self::new(OutboundConfig::default())
    }
}

impl OutboundTranslator {
    pub fn new(config: OutboundConfig) -> Self {
        Self {
            config: OutboundConfig {
                output_channel: config.output_channel & 0x0F,
                mpe: config.mpe,
            },
            frame: 0,
            last_generation: None,
            last_gates: [[false; 128]; PORT_MAX_CHANNELS],
            velocities: [[DEFAULT_VELOCITY; 128]; PORT_MAX_CHANNELS],
            holders: [[0; 128]; PORT_MAX_CHANNELS],
            channel_notes: [60; PORT_MAX_CHANNELS],
            channel_gates: [false; PORT_MAX_CHANNELS],
            pressures: [None; PORT_MAX_CHANNELS],
            pitch_wheels: [PITCH_WHEEL_CENTER; PORT_MAX_CHANNELS],
            mod_wheels: [None; PORT_MAX_CHANNELS],
            controllers: [None; 128],
            start_trigger: SchmittTrigger::default(),
            stop_trigger: SchmittTrigger::default(),
            continue_trigger: SchmittTrigger::default(),
            dropped: 0,
        }
    }

    pub fn config(&self) -> &OutboundConfig {
        &self.config
    }

    /// Current frame stamp for emitted messages.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Messages the sink refused.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Change the output channel, releasing sounding notes on the old one.
    pub fn set_output_channel(&mut self, channel: u8, sink: &mut impl MessageSink) {
        let channel = channel & 0x0F;
        if channel == self.config.output_channel {
            return;
        }
        self.panic(sink);
        self.config.output_channel = channel;
    }

    /// Toggle MPE mode, releasing sounding notes first.
    pub fn set_mpe(&mut self, mpe: bool, sink: &mut impl MessageSink) {
        if mpe == self.config.mpe {
            return;
        }
        tracing::debug!(mpe, "outbound mpe mode changed");
        self.panic(sink);
        self.config.mpe = mpe;
    }

    /// Start a sample. The frame counter restarts at 0 when the block
    /// generation changed and advances by one otherwise. Returns whether a
    /// new block started.
    pub fn sync_generation(&mut self, generation: u64) -> bool {
        let block_changed = self.last_generation != Some(generation);
        self.last_generation = Some(generation);
        self.advance_frame(block_changed);
        block_changed
    }

    /// Same as [`sync_generation`](Self::sync_generation) for units that
    /// already know whether their upstream batch is fresh.
    pub fn advance_frame(&mut self, block_changed: bool) {
        if block_changed {
            self.frame = 0;
        } else {
            self.frame = self.frame.saturating_add(1);
        }
    }

    /// One sample: sync the frame counter, then translate `inputs`.
    pub fn process(&mut self, generation: u64, inputs: &OutboundInputs, sink: &mut impl MessageSink) {
        self.sync_generation(generation);
        self.process_inputs(inputs, sink);
    }

    /// Translate `inputs` at the current frame.
    pub fn process_inputs(&mut self, inputs: &OutboundInputs, sink: &mut impl MessageSink) {
        profiling::scope!("outbound_process");

        let channels = inputs.pitch.channels().max(inputs.gate.channels());
        for c in 0..channels {
            let note = voct_to_note(inputs.pitch.get_poly(c));
            let velocity = volts_to_midi(
                inputs.velocity.get_normal_poly(c, DEFAULT_VELOCITY_VOLTS),
                FULL_SCALE_VOLTS,
            );
            let channel = self.midi_channel(c);
            self.set_velocity(channel, note, velocity);
            self.set_note_gate(c, note, inputs.gate.get_poly(c) >= GATE_THRESHOLD, sink);

            if inputs.aftertouch.is_connected() {
                let pressure = volts_to_midi(inputs.aftertouch.get_poly(c), FULL_SCALE_VOLTS);
                self.set_key_pressure(c, note, pressure, sink);
            }
        }
        // channels that disappeared release their notes
        for c in channels..PORT_MAX_CHANNELS {
            if self.channel_gates[c] {
                let note = self.channel_notes[c];
                self.set_note_gate(c, note, false, sink);
            }
        }

        let wheel_channels = if self.config.mpe { channels } else { 1 };
        for c in 0..wheel_channels {
            if inputs.pitch_wheel.is_connected() {
                let value = volts_to_pitch_wheel(inputs.pitch_wheel.get_poly(c));
                self.set_pitch_wheel(c, value, sink);
            }
            if inputs.mod_wheel.is_connected() {
                let value = volts_to_midi(inputs.mod_wheel.get_poly(c), FULL_SCALE_VOLTS);
                self.set_mod_wheel(c, value, sink);
            }
        }

        if self.start_trigger.process(inputs.start) {
            self.send_transport(Transport::Start, sink);
        }
        if self.stop_trigger.process(inputs.stop) {
            self.send_transport(Transport::Stop, sink);
        }
        if self.continue_trigger.process(inputs.cont) {
            self.send_transport(Transport::Continue, sink);
        }
    }

    /// MIDI channel poly channel `c` is sent on.
    pub fn midi_channel(&self, c: usize) -> u8 {
        if self.config.mpe {
            (c & 0x0F) as u8
        } else {
            self.config.output_channel
        }
    }

    /// Velocity used by the next note-on of `note` on `channel`.
    pub fn set_velocity(&mut self, channel: u8, note: u8, velocity: u8) {
        self.velocities[(channel & 0x0F) as usize][(note & 0x7F) as usize] = velocity.min(127);
    }

    /// Note-on on a rising edge of `note`, note-off on a falling edge,
    /// nothing otherwise.
    pub fn set_gate(&mut self, channel: u8, note: u8, gate: bool, sink: &mut impl MessageSink) {
        let (row, key) = ((channel & 0x0F) as usize, (note & 0x7F) as usize);
        if self.last_gates[row][key] == gate {
            return;
        }
        self.last_gates[row][key] = gate;
        let velocity = self.velocities[row][key];
        let message = if gate {
            TimestampedMessage::note_on(self.frame, channel, note, velocity)
        } else {
            TimestampedMessage::note_off(self.frame, channel, note, velocity)
        };
        self.send(message, sink);
    }

    /// Gate for poly channel `c`. A pitch change while the gate is held
    /// releases the old note before sounding the new one.
    ///
    /// Several poly channels may hold the same note on one MIDI channel. The
    /// note-off goes out only when the last of them lets go.
    pub fn set_note_gate(&mut self, c: usize, note: u8, gate: bool, sink: &mut impl MessageSink) {
        let c = c.min(PORT_MAX_CHANNELS - 1);
        let channel = self.midi_channel(c);
        let row = channel as usize;
        let (prev_note, prev_gate) = (self.channel_notes[c], self.channel_gates[c]);
        let moved = prev_note != note;
        if prev_gate && (!gate || moved) {
            let holders = &mut self.holders[row][(prev_note & 0x7F) as usize];
            *holders = holders.saturating_sub(1);
            let still_held = *holders > 0;
            self.set_gate(channel, prev_note, still_held, sink);
        }
        if gate {
            if !prev_gate || moved {
                let holders = &mut self.holders[row][(note & 0x7F) as usize];
                *holders = holders.saturating_add(1);
            }
            self.set_gate(channel, note, true, sink);
        }
        self.channel_notes[c] = note;
        self.channel_gates[c] = gate;
    }

    /// Poly key pressure for `note`, or channel pressure in MPE mode.
    pub fn set_key_pressure(&mut self, c: usize, note: u8, pressure: u8, sink: &mut impl MessageSink) {
        let c = c.min(PORT_MAX_CHANNELS - 1);
        if self.pressures[c] == Some(pressure) {
            return;
        }
        self.pressures[c] = Some(pressure);
        let channel = self.midi_channel(c);
        let message = if self.config.mpe {
            TimestampedMessage::channel_pressure(self.frame, channel, pressure)
        } else {
            TimestampedMessage::key_pressure(self.frame, channel, note, pressure)
        };
        self.send(message, sink);
    }

    pub fn set_pitch_wheel(&mut self, c: usize, value: u16, sink: &mut impl MessageSink) {
        let c = c.min(PORT_MAX_CHANNELS - 1);
        if self.pitch_wheels[c] == value {
            return;
        }
        self.pitch_wheels[c] = value;
        let message = TimestampedMessage::pitch_wheel(self.frame, self.midi_channel(c), value);
        self.send(message, sink);
    }

    pub fn set_mod_wheel(&mut self, c: usize, value: u8, sink: &mut impl MessageSink) {
        let c = c.min(PORT_MAX_CHANNELS - 1);
        if self.mod_wheels[c] == Some(value) {
            return;
        }
        self.mod_wheels[c] = Some(value);
        let message = TimestampedMessage::control_change(
            self.frame,
            self.midi_channel(c),
            cc::MOD_WHEEL,
            value,
        );
        self.send(message, sink);
    }

    /// Control change on the output channel, sent only when the value moved.
    pub fn set_controller(&mut self, controller: u8, value: u8, sink: &mut impl MessageSink) {
        let controller = controller & 0x7F;
        let value = value.min(127);
        if self.controllers[controller as usize] == Some(value) {
            return;
        }
        self.controllers[controller as usize] = Some(value);
        let message = TimestampedMessage::control_change(
            self.frame,
            self.config.output_channel,
            controller,
            value,
        );
        self.send(message, sink);
    }

    pub fn send_transport(&mut self, transport: Transport, sink: &mut impl MessageSink) {
        self.send(TimestampedMessage::transport(self.frame, transport), sink);
    }

    /// Release every note and forget all cached values.
    pub fn panic(&mut self, sink: &mut impl MessageSink) {
        if self.config.mpe {
            for channel in 0..PORT_MAX_CHANNELS as u8 {
                let message =
                    TimestampedMessage::control_change(self.frame, channel, cc::ALL_NOTES_OFF, 0);
                self.send(message, sink);
            }
        } else {
            for note in 0..=127u8 {
                let message =
                    TimestampedMessage::note_off(self.frame, self.config.output_channel, note, 0);
                self.send(message, sink);
            }
        }
        self.reset();
    }

    /// Forget all edge memory and cached values without emitting anything.
    pub fn reset(&mut self) {
        *self = Self {
            frame: self.frame,
            last_generation: self.last_generation,
            dropped: self.dropped,
            ..Self::new(self.config)
        };
    }

    fn send(&mut self, message: TimestampedMessage, sink: &mut impl MessageSink) {
        if !sink.emit(message) {
            self.dropped += 1;
        }
    }

    pub fn save_state(&self) -> OutboundState {
        OutboundState {
            config: self.config,
        }
    }

    pub fn load_state(&mut self, state: &OutboundState) {
        tracing::debug!(?state, "restoring outbound state");
        self.config = OutboundConfig {
            output_channel: state.config.output_channel & 0x0F,
            mpe: state.config.mpe,
        };
        self.reset();
    }
}
