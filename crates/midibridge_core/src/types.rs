//! Timestamped MIDI messages exchanged with the host bridge.
//!
//! A [`TimestampedMessage`] is the raw wire form: a frame offset inside the
//! current block plus up to three status/data bytes. [`MidiMessage`] is the
//! parsed view the translators dispatch on.

use arrayvec::ArrayVec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bytes stored inline in a message. Longer messages (sysex) are flagged as
/// extended and carry no payload here.
pub const INLINE_DATA_SIZE: usize = 3;

/// Controller numbers with a fixed meaning for the translators.
pub mod cc {
    pub const MOD_WHEEL: u8 = 1;
    pub const SUSTAIN_PEDAL: u8 = 64;
    pub const ALL_NOTES_OFF: u8 = 123;
}

/// Pitch wheel center value (14-bit).
pub const PITCH_WHEEL_CENTER: u16 = 0x2000;
/// Largest 14-bit pitch wheel value.
pub const PITCH_WHEEL_MAX: u16 = 0x3fff;

/// High nibble of a channel message status byte, or `System` for 0xF0..0xFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    NoteOff,
    NoteOn,
    KeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchWheel,
    System,
}

impl Status {
    pub fn from_byte(status_byte: u8) -> Option<Self> {
        match status_byte & 0xF0 {
            0x80 => Some(Status::NoteOff),
            0x90 => Some(Status::NoteOn),
            0xA0 => Some(Status::KeyPressure),
            0xB0 => Some(Status::ControlChange),
            0xC0 => Some(Status::ProgramChange),
            0xD0 => Some(Status::ChannelPressure),
            0xE0 => Some(Status::PitchWheel),
            0xF0 => Some(Status::System),
            // running status / data byte in status position
            _ => None,
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Status::NoteOff => 0x80,
            Status::NoteOn => 0x90,
            Status::KeyPressure => 0xA0,
            Status::ControlChange => 0xB0,
            Status::ProgramChange => 0xC0,
            Status::ChannelPressure => 0xD0,
            Status::PitchWheel => 0xE0,
            Status::System => 0xF0,
        }
    }

    /// Number of bytes a well-formed message with this status occupies.
    fn expected_size(self) -> usize {
        match self {
            Status::ProgramChange | Status::ChannelPressure => 2,
            Status::System => 1,
            _ => 3,
        }
    }
}

/// System realtime transport messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Start,
    Continue,
    Stop,
}

impl Transport {
    pub fn status_byte(self) -> u8 {
        match self {
            Transport::Start => 0xFA,
            Transport::Continue => 0xFB,
            Transport::Stop => 0xFC,
        }
    }

    pub fn from_status_byte(byte: u8) -> Option<Self> {
        match byte {
            0xFA => Some(Transport::Start),
            0xFB => Some(Transport::Continue),
            0xFC => Some(Transport::Stop),
            _ => None,
        }
    }
}

/// Parsed channel or transport message. Data bytes are already masked to
/// seven bits and pitch wheel values recombined to fourteen.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum MidiMessage {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    KeyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PitchWheel { channel: u8, value: u16 },
    Transport(Transport),
}

/// A MIDI message stamped with its frame offset inside the block it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampedMessage {
    pub frame: u32,
    size: u8,
    data: [u8; INLINE_DATA_SIZE],
}

impl TimestampedMessage {
    /// Build from raw bytes. Messages longer than [`INLINE_DATA_SIZE`] keep
    /// their size but no payload, and never parse.
    pub fn from_bytes(frame: u32, bytes: &[u8]) -> Self {
        let mut data = [0u8; INLINE_DATA_SIZE];
        let size = bytes.len().min(u8::MAX as usize) as u8;
        if bytes.len() <= INLINE_DATA_SIZE {
            data[..bytes.len()].copy_from_slice(bytes);
        }
        Self { frame, size, data }
    }

    fn channel_message(frame: u32, status: Status, channel: u8, data1: u8, data2: u8) -> Self {
        Self {
            frame,
            size: 3,
            data: [status.nibble() | (channel & 0x0F), data1 & 0x7F, data2 & 0x7F],
        }
    }

    pub fn note_on(frame: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_message(frame, Status::NoteOn, channel, note, velocity)
    }

    pub fn note_off(frame: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_message(frame, Status::NoteOff, channel, note, velocity)
    }

    pub fn key_pressure(frame: u32, channel: u8, note: u8, pressure: u8) -> Self {
        Self::channel_message(frame, Status::KeyPressure, channel, note, pressure)
    }

    pub fn control_change(frame: u32, channel: u8, controller: u8, value: u8) -> Self {
        Self::channel_message(frame, Status::ControlChange, channel, controller, value)
    }

    pub fn channel_pressure(frame: u32, channel: u8, pressure: u8) -> Self {
        Self {
            frame,
            size: 2,
            data: [Status::ChannelPressure.nibble() | (channel & 0x0F), pressure & 0x7F, 0],
        }
    }

    /// `value` is the 14-bit wheel position, 0x2000 being the center.
    pub fn pitch_wheel(frame: u32, channel: u8, value: u16) -> Self {
        let value = value.min(PITCH_WHEEL_MAX);
        Self::channel_message(
            frame,
            Status::PitchWheel,
            channel,
            (value & 0x7F) as u8,
            ((value >> 7) & 0x7F) as u8,
        )
    }

    pub fn transport(frame: u32, transport: Transport) -> Self {
        Self {
            frame,
            size: 1,
            data: [transport.status_byte(), 0, 0],
        }
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// True for messages whose payload did not fit inline.
    pub fn is_extended(&self) -> bool {
        self.size as usize > INLINE_DATA_SIZE
    }

    /// Inline bytes, empty for extended messages.
    pub fn bytes(&self) -> &[u8] {
        if self.is_extended() {
            &[]
        } else {
            &self.data[..self.size as usize]
        }
    }

    pub fn status_byte(&self) -> u8 {
        self.data[0]
    }

    pub fn status(&self) -> Option<Status> {
        if self.size == 0 || self.is_extended() {
            return None;
        }
        Status::from_byte(self.data[0])
    }

    /// MIDI channel (0-15) for channel messages.
    pub fn channel(&self) -> Option<u8> {
        match self.status()? {
            Status::System => None,
            _ => Some(self.data[0] & 0x0F),
        }
    }

    /// Input channel filter: `0` accepts everything, `1..=16` only that
    /// channel. System messages always pass.
    pub fn passes_channel_filter(&self, filter: u8) -> bool {
        if filter == 0 || self.data[0] >= 0xF0 {
            return true;
        }
        (self.data[0] & 0x0F) == (filter - 1) & 0x0F
    }

    /// Parse into a [`MidiMessage`]. Malformed, truncated or extended messages
    /// return `None`.
    pub fn parse(&self) -> Option<MidiMessage> {
        let status = self.status()?;
        let byte = self.data[0];
        if (self.size as usize) < status.expected_size() {
            return None;
        }
        let channel = byte & 0x0F;
        let d1 = self.data[1] & 0x7F;
        let d2 = self.data[2] & 0x7F;

        let message = match status {
            Status::NoteOff => MidiMessage::NoteOff {
                channel,
                note: d1,
                velocity: d2,
            },
            Status::NoteOn => MidiMessage::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            },
            Status::KeyPressure => MidiMessage::KeyPressure {
                channel,
                note: d1,
                pressure: d2,
            },
            Status::ControlChange => MidiMessage::ControlChange {
                channel,
                controller: d1,
                value: d2,
            },
            Status::ProgramChange => MidiMessage::ProgramChange { channel, program: d1 },
            Status::ChannelPressure => MidiMessage::ChannelPressure {
                channel,
                pressure: d1,
            },
            Status::PitchWheel => MidiMessage::PitchWheel {
                channel,
                value: ((d2 as u16) << 7) | d1 as u16,
            },
            Status::System => MidiMessage::Transport(Transport::from_status_byte(byte)?),
        };
        Some(message)
    }
}

/// Raw CC value including the eighth bit, which some controllers abuse to
/// send negative values.
pub fn raw_cc_value(message: &TimestampedMessage) -> Option<(u8, u8, i8)> {
    match message.status()? {
        Status::ControlChange if message.size() >= 3 => {
            let bytes = message.bytes();
            Some((bytes[0] & 0x0F, bytes[1] & 0x7F, bytes[2] as i8))
        }
        _ => None,
    }
}

/// One block's worth of host input: the batch plus the host's block
/// generation counter, which changes every time a new batch is delivered.
#[derive(Debug, Clone, Copy)]
pub struct BlockInput<'a> {
    pub generation: u64,
    pub events: &'a [TimestampedMessage],
}

impl<'a> BlockInput<'a> {
    pub fn new(generation: u64, events: &'a [TimestampedMessage]) -> Self {
        Self { generation, events }
    }
}

/// Destination for translated messages.
pub trait MessageSink {
    /// Deliver one message. Returns `false` if it was dropped.
    fn emit(&mut self, message: TimestampedMessage) -> bool;
}

impl MessageSink for Vec<TimestampedMessage> {
    fn emit(&mut self, message: TimestampedMessage) -> bool {
        self.push(message);
        true
    }
}

impl<const N: usize> MessageSink for ArrayVec<TimestampedMessage, N> {
    fn emit(&mut self, message: TimestampedMessage) -> bool {
        self.try_push(message).is_ok()
    }
}

impl<S: MessageSink + ?Sized> MessageSink for &mut S {
    fn emit(&mut self, message: TimestampedMessage) -> bool {
        (**self).emit(message)
    }
}

/// Sink that throws everything away, for units whose output side is unused.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn emit(&mut self, _message: TimestampedMessage) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_roundtrip_bytes() {
        let m = TimestampedMessage::note_on(12, 3, 60, 100);
        assert_eq!(m.bytes(), &[0x93, 60, 100]);
        assert_eq!(m.channel(), Some(3));
        assert_eq!(
            m.parse(),
            Some(MidiMessage::NoteOn {
                channel: 3,
                note: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn test_pitch_wheel_14_bit() {
        let m = TimestampedMessage::pitch_wheel(0, 0, 0x3000);
        match m.parse() {
            Some(MidiMessage::PitchWheel { value, .. }) => assert_eq!(value, 0x3000),
            other => panic!("expected pitch wheel, got {:?}", other),
        }
        let clamped = TimestampedMessage::pitch_wheel(0, 0, 0xFFFF);
        assert_eq!(
            clamped.parse(),
            Some(MidiMessage::PitchWheel {
                channel: 0,
                value: PITCH_WHEEL_MAX
            })
        );
    }

    #[test]
    fn test_transport_parse() {
        let m = TimestampedMessage::from_bytes(5, &[0xFB]);
        assert_eq!(m.parse(), Some(MidiMessage::Transport(Transport::Continue)));
        // clock tick is a valid system message but not a transport message
        assert_eq!(TimestampedMessage::from_bytes(0, &[0xF8]).parse(), None);
    }

    #[test]
    fn test_extended_and_truncated_messages_are_ignored() {
        let sysex = TimestampedMessage::from_bytes(0, &[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]);
        assert!(sysex.is_extended());
        assert!(sysex.bytes().is_empty());
        assert_eq!(sysex.parse(), None);

        let truncated = TimestampedMessage::from_bytes(0, &[0x90, 60]);
        assert_eq!(truncated.parse(), None);

        let data_byte = TimestampedMessage::from_bytes(0, &[0x40, 1, 2]);
        assert_eq!(data_byte.parse(), None);
    }

    #[test]
    fn test_channel_filter() {
        let m = TimestampedMessage::control_change(0, 4, 1, 10);
        assert!(m.passes_channel_filter(0));
        assert!(m.passes_channel_filter(5));
        assert!(!m.passes_channel_filter(1));
        let start = TimestampedMessage::transport(0, Transport::Start);
        assert!(start.passes_channel_filter(9));
    }

    #[test]
    fn test_raw_cc_value_keeps_sign_bit() {
        let m = TimestampedMessage::from_bytes(0, &[0xB0, 7, 0xFF]);
        assert_eq!(raw_cc_value(&m), Some((0, 7, -1)));
    }

    #[test]
    fn test_midi_message_serializes_tagged() {
        let json = serde_json::to_value(MidiMessage::ControlChange {
            channel: 0,
            controller: 64,
            value: 127,
        })
        .unwrap();
        assert_eq!(json["type"], "controlChange");
        assert_eq!(json["data"]["controller"], 64);
    }
}
