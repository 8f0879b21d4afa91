//! MIDI to CV converter with polyphonic voice allocation.
//!
//! Consumes one block's message batch frame by frame and produces pitch, gate,
//! velocity, aftertouch, retrigger, wheel and transport voltages every sample.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FULL_SCALE_VOLTS;
use super::allocator::{PolyMode, VoiceAllocator};
use super::cursor::MessageCursor;
use super::held_notes::HeldNoteStack;
use super::voice::VoiceBank;
use crate::ProcessArgs;
use crate::dsp::utils::{midi_to_volts, note_to_voct, pitch_wheel_to_bipolar};
use crate::dsp::{ExponentialFilter, PulseGenerator, TRIGGER_PULSE_SECONDS};
use crate::poly::{PORT_MAX_CHANNELS, PolyVoltage};
use crate::state::{PersistedState, clamp_channel_filter, clamp_channels};
use crate::types::{BlockInput, MidiMessage, TimestampedMessage, Transport, cc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct InboundConfig {
    /// Number of polyphonic voices (1-16)
    pub channels: usize,

    /// Polyphonic voice allocation mode
    pub poly_mode: PolyMode,

    /// Smooth the pitch and mod wheel outputs
    pub smooth: bool,

    /// Pitch bend range in semitones (0 = disabled, default 2)
    pub pitch_bend_range: u8,

    /// Drop the gate for one sample when a note lands on a sounding channel
    pub force_gate_gap: bool,

    /// MIDI channel filter (1-16, 0 = all channels)
    pub input_channel: u8,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            poly_mode: PolyMode::Rotate,
            smooth: true,
            pitch_bend_range: 2,
            force_gate_gap: false,
            input_channel: 0,
        }
    }
}

impl InboundConfig {
    fn sanitized(mut self) -> Self {
        self.channels = clamp_channels(self.channels);
        self.input_channel = clamp_channel_filter(self.input_channel);
        self.pitch_bend_range = self.pitch_bend_range.min(96);
        self
    }
}

/// Voltages produced each sample.
///
/// Note outputs carry `channels` channels; wheel outputs carry 16 in MPE mode
/// and 1 otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundOutputs {
    /// Pitch in 1V/octave (0V = C4), bend included
    pub pitch: PolyVoltage,
    /// 0V or 10V
    pub gate: PolyVoltage,
    /// 0-10V
    pub velocity: PolyVoltage,
    /// 0-10V
    pub aftertouch: PolyVoltage,
    /// 10V for 1ms on each note-on
    pub retrigger: PolyVoltage,
    /// -5V to +5V, unscaled by the bend range
    pub pitch_wheel: PolyVoltage,
    /// 0-10V
    pub mod_wheel: PolyVoltage,
    pub start: f32,
    pub stop: f32,
    pub cont: f32,
}

/// Persisted form of an [`InboundTranslator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct InboundState {
    #[serde(flatten)]
    pub config: InboundConfig,
    /// Last pitch wheel position, stored outside MPE mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pitch: Option<u16>,
    /// Last mod wheel position, stored outside MPE mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_mod: Option<u8>,
}

impl PersistedState for InboundState {
    const KIND: &'static str = "inbound";
}

#[derive(Debug, Clone)]
pub struct InboundTranslator {
    config: InboundConfig,
    cursor: MessageCursor,
    bank: VoiceBank,
    held_notes: HeldNoteStack,
    allocator: VoiceAllocator,
    pedal: bool,

    retrigger_pulses: [PulseGenerator; PORT_MAX_CHANNELS],
    /// Channels whose gate reads low for the next sample
    gate_gaps: [bool; PORT_MAX_CHANNELS],
    start_pulse: PulseGenerator,
    stop_pulse: PulseGenerator,
    continue_pulse: PulseGenerator,

    pitch_filters: [ExponentialFilter; PORT_MAX_CHANNELS],
    mod_filters: [ExponentialFilter; PORT_MAX_CHANNELS],

    outputs: InboundOutputs,
}

impl Default for InboundTranslator {
    fn default() -> Self {
        Self::new(InboundConfig::default())
    }
}

impl InboundTranslator {
    pub fn new(config: InboundConfig) -> Self {
        Self {
            config: config.sanitized(),
            cursor: MessageCursor::new(),
            bank: VoiceBank::new(),
            held_notes: HeldNoteStack::new(),
            allocator: VoiceAllocator::new(),
            pedal: false,
            retrigger_pulses: [PulseGenerator::new(); PORT_MAX_CHANNELS],
            gate_gaps: [false; PORT_MAX_CHANNELS],
            start_pulse: PulseGenerator::new(),
            stop_pulse: PulseGenerator::new(),
            continue_pulse: PulseGenerator::new(),
            pitch_filters: [ExponentialFilter::default(); PORT_MAX_CHANNELS],
            mod_filters: [ExponentialFilter::default(); PORT_MAX_CHANNELS],
            outputs: InboundOutputs::default(),
        }
    }

    pub fn config(&self) -> &InboundConfig {
        &self.config
    }

    /// Apply a whole configuration. Channel count and mode changes panic.
    pub fn set_config(&mut self, config: InboundConfig) {
        let config = config.sanitized();
        self.set_channels(config.channels);
        self.set_poly_mode(config.poly_mode);
        self.config.smooth = config.smooth;
        self.config.pitch_bend_range = config.pitch_bend_range;
        self.config.force_gate_gap = config.force_gate_gap;
        self.config.input_channel = config.input_channel;
    }

    pub fn set_channels(&mut self, channels: usize) {
        let channels = clamp_channels(channels);
        if channels == self.config.channels {
            return;
        }
        tracing::debug!(from = self.config.channels, to = channels, "inbound channel count changed");
        self.config.channels = channels;
        self.panic();
    }

    pub fn set_poly_mode(&mut self, mode: PolyMode) {
        if mode == self.config.poly_mode {
            return;
        }
        tracing::debug!(from = ?self.config.poly_mode, to = ?mode, "inbound poly mode changed");
        self.config.poly_mode = mode;
        self.panic();
    }

    pub fn set_smooth(&mut self, smooth: bool) {
        self.config.smooth = smooth;
    }

    pub fn set_pitch_bend_range(&mut self, semitones: u8) {
        self.config.pitch_bend_range = semitones.min(96);
    }

    pub fn set_force_gate_gap(&mut self, enabled: bool) {
        self.config.force_gate_gap = enabled;
    }

    pub fn set_input_channel(&mut self, filter: u8) {
        self.config.input_channel = clamp_channel_filter(filter);
    }

    pub fn voice_bank(&self) -> &VoiceBank {
        &self.bank
    }

    pub fn held_notes(&self) -> &HeldNoteStack {
        &self.held_notes
    }

    pub fn pedal(&self) -> bool {
        self.pedal
    }

    pub fn outputs(&self) -> &InboundOutputs {
        &self.outputs
    }

    /// Events dropped because a block's batch overflowed the queue.
    pub fn dropped_events(&self) -> u64 {
        self.cursor.dropped()
    }

    /// Silence everything: gates off, wheels centered, stack and pedal cleared.
    pub fn panic(&mut self) {
        self.bank.panic();
        self.held_notes.clear();
        self.pedal = false;
        self.allocator.reset();
        self.gate_gaps = [false; PORT_MAX_CHANNELS];
        for pulse in &mut self.retrigger_pulses {
            pulse.reset();
        }
        for filter in self.pitch_filters.iter_mut().chain(self.mod_filters.iter_mut()) {
            filter.reset();
        }
    }

    /// Panic and forget any pending batch. Configuration is kept.
    pub fn reset(&mut self) {
        self.cursor.reset();
        self.panic();
        self.start_pulse.reset();
        self.stop_pulse.reset();
        self.continue_pulse.reset();
    }

    /// Start playing back a new batch from frame 0.
    pub fn load(&mut self, events: &[TimestampedMessage]) {
        self.cursor.load(events);
    }

    /// Pick up the host's batch if a new block started, then process one
    /// sample. Returns whether a new block started.
    pub fn process_block(&mut self, args: &ProcessArgs, input: BlockInput<'_>) -> bool {
        let block_changed = self.cursor.sync(&input);
        self.process(args);
        block_changed
    }

    /// Dispatch the events due at the current frame, advance one frame and
    /// compute this sample's outputs.
    pub fn process(&mut self, args: &ProcessArgs) -> &InboundOutputs {
        profiling::scope!("inbound_process");

        while let Some(event) = self.cursor.pop_due() {
            self.handle_message(&event);
        }
        self.cursor.advance();

        self.update_outputs(args.sample_time);
        &self.outputs
    }

    /// Apply one raw message immediately. Filtered, malformed and extended
    /// messages are ignored.
    pub fn handle_message(&mut self, message: &TimestampedMessage) {
        if !message.passes_channel_filter(self.config.input_channel) {
            return;
        }
        if let Some(parsed) = message.parse() {
            self.dispatch(parsed);
        }
    }

    /// Apply one parsed message immediately.
    pub fn dispatch(&mut self, message: MidiMessage) {
        match message {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } if velocity > 0 => self.press_note(channel, note, velocity),
            MidiMessage::NoteOn { note, .. } | MidiMessage::NoteOff { note, .. } => {
                self.release_note(note)
            }
            MidiMessage::KeyPressure { note, pressure, .. } => {
                for voice in self.bank.voices_mut().iter_mut().filter(|v| v.note == note) {
                    voice.aftertouch = pressure;
                }
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                if self.is_mpe() {
                    self.bank.voice_mut(channel as usize).aftertouch = pressure;
                } else {
                    for voice in self.bank.voices_mut() {
                        voice.aftertouch = pressure;
                    }
                }
            }
            MidiMessage::PitchWheel { channel, value } => {
                let slot = self.wheel_slot(channel);
                self.bank.set_pitch_wheel(slot, value);
            }
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => self.control_change(channel, controller, value),
            MidiMessage::Transport(transport) => {
                let pulse = match transport {
                    Transport::Start => &mut self.start_pulse,
                    Transport::Stop => &mut self.stop_pulse,
                    Transport::Continue => &mut self.continue_pulse,
                };
                pulse.trigger(TRIGGER_PULSE_SECONDS);
            }
            MidiMessage::ProgramChange { .. } => {}
        }
    }

    fn is_mpe(&self) -> bool {
        self.config.poly_mode.is_mpe()
    }

    fn wheel_slot(&self, channel: u8) -> usize {
        if self.is_mpe() { channel as usize & 0x0F } else { 0 }
    }

    /// Channels a note can land on: all sixteen in MPE mode.
    fn voice_channels(&self) -> usize {
        if self.is_mpe() { PORT_MAX_CHANNELS } else { self.config.channels }
    }

    fn wheel_channels(&self) -> usize {
        if self.is_mpe() { PORT_MAX_CHANNELS } else { 1 }
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        match controller {
            cc::MOD_WHEEL => {
                let slot = self.wheel_slot(channel);
                self.bank.set_mod_wheel(slot, value);
            }
            cc::SUSTAIN_PEDAL => {
                if value >= 64 {
                    self.press_pedal();
                } else {
                    self.release_pedal();
                }
            }
            cc::ALL_NOTES_OFF if value == 0 => self.panic(),
            _ => {}
        }
    }

    fn press_note(&mut self, channel: u8, note: u8, velocity: u8) {
        self.held_notes.push(note);

        let c = self.allocator.assign(
            self.config.poly_mode,
            note,
            channel,
            &self.bank,
            self.config.channels,
        );
        let force_gap = self.config.force_gate_gap;
        let voice = self.bank.voice_mut(c);
        if force_gap && voice.gate {
            self.gate_gaps[c] = true;
        }
        voice.note = note;
        voice.gate = true;
        voice.velocity = velocity;
        self.retrigger_pulses[c].trigger(TRIGGER_PULSE_SECONDS);
    }

    fn release_note(&mut self, note: u8) {
        self.held_notes.remove(note);
        if self.pedal {
            return;
        }

        // every channel sounding the note lets go, MPE included
        let channels = self.voice_channels();
        while let Some(c) = self.bank.find_sounding(note, channels) {
            self.bank.voice_mut(c).gate = false;
        }

        if channels == 1 && self.bank.voice(0).note == note {
            if let Some(last) = self.held_notes.last() {
                // legato back to the previous held note
                let voice = self.bank.voice_mut(0);
                voice.note = last;
                voice.gate = true;
            }
        }
    }

    fn press_pedal(&mut self) {
        self.pedal = true;
    }

    fn release_pedal(&mut self) {
        if !self.pedal {
            return;
        }
        self.pedal = false;

        if self.config.channels == 1 && !self.is_mpe() {
            let voice = self.bank.voice_mut(0);
            match self.held_notes.last() {
                Some(last) => voice.note = last,
                None => voice.gate = false,
            }
            return;
        }

        let held = &self.held_notes;
        for voice in self.bank.voices_mut().iter_mut().filter(|v| v.gate) {
            voice.gate = held.contains(voice.note);
        }
    }

    fn update_outputs(&mut self, dt: f32) {
        let channels = self.config.channels;
        let wheel_channels = self.wheel_channels();
        let smooth = self.config.smooth;
        let bend_range = self.config.pitch_bend_range as f32;
        let outputs = &mut self.outputs;

        outputs.pitch_wheel.set_channels(wheel_channels);
        outputs.mod_wheel.set_channels(wheel_channels);
        for c in 0..wheel_channels {
            let pw = pitch_wheel_to_bipolar(self.bank.pitch_wheel(c));
            let md = self.bank.mod_wheel(c) as f32 / 127.0;
            let (pw, md) = if smooth {
                (
                    self.pitch_filters[c].process(dt, pw),
                    self.mod_filters[c].process(dt, md),
                )
            } else {
                self.pitch_filters[c].snap(pw);
                self.mod_filters[c].snap(md);
                (pw, md)
            };
            outputs.pitch_wheel.set(c, pw * 5.0);
            outputs.mod_wheel.set(c, md * FULL_SCALE_VOLTS);
        }

        for output in [
            &mut outputs.pitch,
            &mut outputs.gate,
            &mut outputs.velocity,
            &mut outputs.aftertouch,
            &mut outputs.retrigger,
        ] {
            output.set_channels(channels);
        }

        for c in 0..PORT_MAX_CHANNELS {
            let retrigger = self.retrigger_pulses[c].process(dt);
            if c >= channels {
                continue;
            }
            let voice = self.bank.voice(c);
            let bend = self.pitch_filters[if wheel_channels > 1 { c } else { 0 }].out;

            let pitch = note_to_voct(voice.note) + bend * bend_range / 12.0;
            let gate = if std::mem::take(&mut self.gate_gaps[c]) {
                0.0
            } else if voice.gate {
                FULL_SCALE_VOLTS
            } else {
                0.0
            };

            outputs.pitch.set(c, pitch);
            outputs.gate.set(c, gate);
            outputs.velocity.set(c, midi_to_volts(voice.velocity, FULL_SCALE_VOLTS));
            outputs.aftertouch.set(c, midi_to_volts(voice.aftertouch, FULL_SCALE_VOLTS));
            outputs.retrigger.set(c, if retrigger { FULL_SCALE_VOLTS } else { 0.0 });
        }

        outputs.start = pulse_volts(&mut self.start_pulse, dt);
        outputs.stop = pulse_volts(&mut self.stop_pulse, dt);
        outputs.cont = pulse_volts(&mut self.continue_pulse, dt);
    }

    pub fn save_state(&self) -> InboundState {
        let (last_pitch, last_mod) = if self.is_mpe() {
            (None, None)
        } else {
            (Some(self.bank.pitch_wheel(0)), Some(self.bank.mod_wheel(0)))
        };
        InboundState {
            config: self.config,
            last_pitch,
            last_mod,
        }
    }

    pub fn load_state(&mut self, state: &InboundState) {
        tracing::debug!(?state, "restoring inbound state");
        self.set_config(state.config);
        if !self.is_mpe() {
            if let Some(pitch) = state.last_pitch {
                self.bank.set_pitch_wheel(0, pitch);
                self.pitch_filters[0].snap(pitch_wheel_to_bipolar(self.bank.pitch_wheel(0)));
            }
            if let Some(value) = state.last_mod {
                self.bank.set_mod_wheel(0, value);
                self.mod_filters[0].snap(self.bank.mod_wheel(0) as f32 / 127.0);
            }
        }
    }
}

fn pulse_volts(pulse: &mut PulseGenerator, dt: f32) -> f32 {
    if pulse.process(dt) { FULL_SCALE_VOLTS } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PITCH_WHEEL_CENTER;

    fn poly(channels: usize, mode: PolyMode) -> InboundTranslator {
        InboundTranslator::new(InboundConfig {
            channels,
            poly_mode: mode,
            ..InboundConfig::default()
        })
    }

    fn note_on(t: &mut InboundTranslator, note: u8) {
        t.handle_message(&TimestampedMessage::note_on(0, 0, note, 100));
    }

    fn note_off(t: &mut InboundTranslator, note: u8) {
        t.handle_message(&TimestampedMessage::note_off(0, 0, note, 0));
    }

    fn sustain(t: &mut InboundTranslator, down: bool) {
        let value = if down { 127 } else { 0 };
        t.handle_message(&TimestampedMessage::control_change(0, 0, cc::SUSTAIN_PEDAL, value));
    }

    #[test]
    fn test_rotate_two_channel_scenario() {
        let mut t = poly(2, PolyMode::Rotate);
        note_on(&mut t, 60);
        note_on(&mut t, 64);
        assert_eq!(t.voice_bank().voice(0).note, 60);
        assert_eq!(t.voice_bank().voice(1).note, 64);
        note_off(&mut t, 60);
        assert!(!t.voice_bank().voice(0).gate);
        note_on(&mut t, 67);
        assert_eq!(t.voice_bank().voice(0).note, 67);
        assert!(t.voice_bank().voice(0).gate);
        assert!(t.voice_bank().voice(1).gate);
    }

    #[test]
    fn test_note_on_zero_velocity_releases() {
        let mut t = poly(1, PolyMode::Rotate);
        note_on(&mut t, 60);
        t.handle_message(&TimestampedMessage::note_on(0, 0, 60, 0));
        assert!(!t.voice_bank().voice(0).gate);
        assert!(t.held_notes().is_empty());
    }

    #[test]
    fn test_mono_release_falls_back_to_previous_note() {
        let mut t = poly(1, PolyMode::Rotate);
        note_on(&mut t, 60);
        note_on(&mut t, 64);
        note_off(&mut t, 64);
        let voice = t.voice_bank().voice(0);
        assert_eq!(voice.note, 60);
        assert!(voice.gate);
    }

    #[test]
    fn test_sustain_holds_until_pedal_release() {
        let mut t = poly(4, PolyMode::Rotate);
        note_on(&mut t, 60);
        note_on(&mut t, 62);
        sustain(&mut t, true);
        note_off(&mut t, 60);
        assert!(t.voice_bank().voice(0).gate);
        sustain(&mut t, false);
        assert!(!t.voice_bank().voice(0).gate);
        assert!(t.voice_bank().voice(1).gate);
    }

    #[test]
    fn test_mono_pedal_release_with_nothing_held_closes_gate() {
        let mut t = poly(1, PolyMode::Rotate);
        sustain(&mut t, true);
        note_on(&mut t, 60);
        note_off(&mut t, 60);
        assert!(t.voice_bank().voice(0).gate);
        sustain(&mut t, false);
        assert!(!t.voice_bank().voice(0).gate);
    }

    #[test]
    fn test_all_notes_off_panics() {
        let mut t = poly(4, PolyMode::Rotate);
        note_on(&mut t, 60);
        t.handle_message(&TimestampedMessage::control_change(0, 0, cc::ALL_NOTES_OFF, 5));
        assert!(t.voice_bank().voice(0).gate);
        t.handle_message(&TimestampedMessage::control_change(0, 0, cc::ALL_NOTES_OFF, 0));
        assert_eq!(t.voice_bank().gate_count(16), 0);
        assert!(t.held_notes().is_empty());
    }

    #[test]
    fn test_changing_channel_count_panics() {
        let mut t = poly(4, PolyMode::Rotate);
        note_on(&mut t, 60);
        t.set_channels(4);
        assert!(t.voice_bank().voice(0).gate);
        t.set_channels(8);
        assert!(!t.voice_bank().voice(0).gate);
    }

    #[test]
    fn test_mpe_routes_by_message_channel() {
        let mut t = poly(16, PolyMode::Mpe);
        t.handle_message(&TimestampedMessage::note_on(0, 3, 60, 90));
        t.handle_message(&TimestampedMessage::pitch_wheel(0, 3, 0));
        t.handle_message(&TimestampedMessage::channel_pressure(0, 3, 50));
        assert!(t.voice_bank().voice(3).gate);
        assert_eq!(t.voice_bank().voice(3).aftertouch, 50);
        assert_eq!(t.voice_bank().voice(0).aftertouch, 0);
        assert_eq!(t.voice_bank().pitch_wheel(3), 0);
        assert_eq!(t.voice_bank().pitch_wheel(0), PITCH_WHEEL_CENTER);
    }

    #[test]
    fn test_mpe_release_closes_every_channel_sounding_the_note() {
        let mut t = poly(16, PolyMode::Mpe);
        t.handle_message(&TimestampedMessage::note_on(0, 1, 60, 90));
        t.handle_message(&TimestampedMessage::note_on(0, 2, 60, 90));
        assert!(t.voice_bank().voice(1).gate);
        assert!(t.voice_bank().voice(2).gate);

        t.handle_message(&TimestampedMessage::note_off(0, 1, 60, 0));
        assert!(!t.voice_bank().voice(1).gate);
        assert!(!t.voice_bank().voice(2).gate);
        assert!(t.held_notes().is_empty());
        assert_eq!(t.voice_bank().gate_count(16), 0);
    }

    #[test]
    fn test_key_pressure_reaches_matching_voices_only() {
        let mut t = poly(4, PolyMode::Rotate);
        note_on(&mut t, 60);
        note_on(&mut t, 64);
        t.handle_message(&TimestampedMessage::key_pressure(0, 0, 64, 77));
        assert_eq!(t.voice_bank().voice(0).aftertouch, 0);
        assert_eq!(t.voice_bank().voice(1).aftertouch, 77);
    }

    #[test]
    fn test_channel_pressure_broadcasts_outside_mpe() {
        let mut t = poly(4, PolyMode::Rotate);
        note_on(&mut t, 60);
        t.handle_message(&TimestampedMessage::channel_pressure(0, 5, 33));
        for voice in t.voice_bank().voices() {
            assert_eq!(voice.aftertouch, 33);
        }
    }

    #[test]
    fn test_mod_wheel_addressing() {
        let mut t = poly(4, PolyMode::Rotate);
        t.handle_message(&TimestampedMessage::control_change(0, 6, cc::MOD_WHEEL, 90));
        assert_eq!(t.voice_bank().mod_wheel(0), 90);
        assert_eq!(t.voice_bank().mod_wheel(6), 0);

        let mut t = poly(16, PolyMode::Mpe);
        t.handle_message(&TimestampedMessage::control_change(0, 6, cc::MOD_WHEEL, 90));
        assert_eq!(t.voice_bank().mod_wheel(6), 90);
        assert_eq!(t.voice_bank().mod_wheel(0), 0);
    }

    #[test]
    fn test_smoothed_mod_wheel_ramps() {
        let args = ProcessArgs::default();
        let mut t = poly(1, PolyMode::Rotate);
        t.handle_message(&TimestampedMessage::control_change(0, 0, cc::MOD_WHEEL, 127));
        let first = t.process(&args).mod_wheel.get(0);
        assert!(first > 0.0 && first < 1.0, "first sample jumped to {first}");

        let mut previous = first;
        for _ in 0..24_000 {
            let value = t.process(&args).mod_wheel.get(0);
            assert!(value >= previous);
            previous = value;
        }
        assert!((previous - 10.0).abs() < 1e-3, "settled at {previous}");
    }

    #[test]
    fn test_channel_filter() {
        let mut t = InboundTranslator::new(InboundConfig {
            input_channel: 2,
            ..InboundConfig::default()
        });
        t.handle_message(&TimestampedMessage::note_on(0, 0, 60, 100));
        assert!(!t.voice_bank().voice(0).gate);
        t.handle_message(&TimestampedMessage::note_on(0, 1, 60, 100));
        assert!(t.voice_bank().voice(0).gate);
    }

    #[test]
    fn test_outputs_scale() {
        let args = ProcessArgs::default();
        let mut t = poly(1, PolyMode::Rotate);
        t.set_smooth(false);
        t.handle_message(&TimestampedMessage::note_on(0, 0, 72, 127));
        let out = t.process(&args);
        assert!((out.pitch.get(0) - 1.0).abs() < 1e-6);
        assert_eq!(out.gate.get(0), 10.0);
        assert!((out.velocity.get(0) - 10.0).abs() < 1e-5);
        assert_eq!(out.retrigger.get(0), 10.0);
        assert_eq!(out.pitch_wheel.channels(), 1);
    }

    #[test]
    fn test_bend_moves_pitch() {
        let args = ProcessArgs::default();
        let mut t = poly(1, PolyMode::Rotate);
        t.set_smooth(false);
        note_on(&mut t, 60);
        t.handle_message(&TimestampedMessage::pitch_wheel(0, 0, 0x3fff));
        let out = t.process(&args);
        assert!((out.pitch.get(0) - 2.0 / 12.0).abs() < 1e-6);
        assert!((out.pitch_wheel.get(0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_force_gate_gap_drops_one_sample() {
        let args = ProcessArgs::default();
        let mut t = poly(1, PolyMode::Rotate);
        t.set_force_gate_gap(true);
        note_on(&mut t, 60);
        assert_eq!(t.process(&args).gate.get(0), 10.0);
        note_on(&mut t, 62);
        assert_eq!(t.process(&args).gate.get(0), 0.0);
        assert_eq!(t.process(&args).gate.get(0), 10.0);
    }

    #[test]
    fn test_transport_pulse() {
        let args = ProcessArgs::default();
        let mut t = InboundTranslator::default();
        t.handle_message(&TimestampedMessage::transport(0, Transport::Start));
        assert_eq!(t.process(&args).start, 10.0);
        assert_eq!(t.outputs().stop, 0.0);
        for _ in 0..60 {
            t.process(&args);
        }
        assert_eq!(t.outputs().start, 0.0);
    }

    #[test]
    fn test_state_round_trip() {
        let mut t = poly(4, PolyMode::Reuse);
        t.handle_message(&TimestampedMessage::pitch_wheel(0, 0, 1000));
        let state = t.save_state();
        assert_eq!(state.last_pitch, Some(1000));

        let json = state.to_json().unwrap();
        assert_eq!(json["polyMode"], "reuse");
        assert_eq!(json["channels"], 4);

        let mut restored = InboundTranslator::default();
        restored.load_state(&InboundState::from_json(&json).unwrap());
        assert_eq!(restored.config().channels, 4);
        assert_eq!(restored.config().poly_mode, PolyMode::Reuse);
        assert_eq!(restored.voice_bank().pitch_wheel(0), 1000);
    }

    #[test]
    fn test_mpe_state_omits_wheels() {
        let t = poly(16, PolyMode::Mpe);
        let json = t.save_state().to_json().unwrap();
        assert!(json.get("lastPitch").is_none());
        assert!(json.get("lastMod").is_none());
    }
}
