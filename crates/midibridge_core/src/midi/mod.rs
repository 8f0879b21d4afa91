//! MIDI <-> CV translation.
//!
//! The inbound side turns a timestamped message stream into per-channel
//! voltages; the outbound side turns voltages back into messages, emitting
//! only on edges and value changes. Both run once per sample.

pub mod allocator;
pub mod bridge;
pub mod cc;
pub mod cursor;
pub mod gate;
pub mod held_notes;
pub mod inbound;
pub mod outbound;
pub mod voice;

pub use allocator::{PolyMode, VoiceAllocator};
pub use bridge::NoteBridge;
pub use cc::CcConverter;
pub use cursor::MessageCursor;
pub use gate::GateConverter;
pub use held_notes::HeldNoteStack;
pub use inbound::{InboundConfig, InboundOutputs, InboundState, InboundTranslator};
pub use outbound::{OutboundConfig, OutboundInputs, OutboundState, OutboundTranslator};
pub use voice::{Voice, VoiceBank};

/// Full-scale voltage for gates, velocity, aftertouch, mod wheel and CC outputs.
pub const FULL_SCALE_VOLTS: f32 = 10.0;
