//! CC-driven map with 120 slots.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::controller::{MapController, MapState};
use super::destination::DestinationResolver;
use crate::ProcessArgs;
use crate::dsp::ClockDivider;
use crate::midi::MessageCursor;
use crate::state::{PersistedState, clamp_channel_filter};
use crate::types::{BlockInput, TimestampedMessage, raw_cc_value};

pub const MIDI_MAP_SLOTS: usize = 120;

/// Slots are applied once every this many samples.
pub const APPLY_DIVISION: u32 = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct MidiMapState {
    #[serde(flatten)]
    pub map: MapState,
    pub input_channel: u8,
}

impl PersistedState for MidiMapState {
    const KIND: &'static str = "midi map";
}

#[derive(Debug, Clone)]
pub struct MidiMap {
    controller: MapController<MIDI_MAP_SLOTS>,
    cursor: MessageCursor,
    divider: ClockDivider,
    input_channel: u8,
}

impl Default for MidiMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiMap {
    pub fn new() -> Self {
        Self {
            controller: MapController::new(),
            cursor: MessageCursor::new(),
            divider: ClockDivider::new(APPLY_DIVISION),
            input_channel: 0,
        }
    }

    pub fn controller(&self) -> &MapController<MIDI_MAP_SLOTS> {
        &self.controller
    }

    /// Learn sessions and destination picks go through the controller.
    pub fn controller_mut(&mut self) -> &mut MapController<MIDI_MAP_SLOTS> {
        &mut self.controller
    }

    pub fn input_channel(&self) -> u8 {
        self.input_channel
    }

    pub fn set_input_channel(&mut self, filter: u8) {
        self.input_channel = clamp_channel_filter(filter);
    }

    /// Apply one smoothing setting to every slot.
    pub fn set_smooth(&mut self, smooth: bool) {
        for slot in 0..MIDI_MAP_SLOTS {
            self.controller.set_smooth(slot, smooth);
        }
    }

    /// Run one sample. Returns whether a fresh batch was picked up.
    pub fn process(&mut self, args: &ProcessArgs, input: BlockInput<'_>) -> bool {
        let block_changed = self.cursor.sync(&input);
        while let Some(event) = self.cursor.pop_due() {
            self.handle_message(&event);
        }
        self.cursor.advance();

        if self.divider.process() {
            self.controller
                .apply(args.sample_time * self.divider.division() as f32);
        }
        block_changed
    }

    pub fn handle_message(&mut self, message: &TimestampedMessage) {
        if !message.passes_channel_filter(self.input_channel) {
            return;
        }
        let Some((_, cc, value)) = raw_cc_value(message) else {
            return;
        };
        // negative values from abusive controllers are ignored outright
        if value < 0 {
            return;
        }
        if self.controller.observe(cc, value as f32 / 127.0) {
            tracing::debug!(cc, "midi map learned controller");
        }
    }

    /// Clear every slot and forget observed values.
    pub fn reset(&mut self) {
        self.controller = MapController::new();
        self.cursor.reset();
        self.divider.reset();
    }

    pub fn save_state(&self) -> MidiMapState {
        MidiMapState {
            map: self.controller.save_state(),
            input_channel: self.input_channel,
        }
    }

    pub fn load_state(&mut self, state: &MidiMapState, resolver: &impl DestinationResolver) {
        self.controller.load_state(&state.map, resolver);
        self.set_input_channel(state.input_channel);
    }
}
