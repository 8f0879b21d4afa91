//! Bidirectional note bridge: host MIDI in to CV, CV to host MIDI out.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::inbound::{InboundOutputs, InboundState, InboundTranslator};
use super::outbound::{OutboundInputs, OutboundState, OutboundTranslator};
use crate::ProcessArgs;
use crate::state::PersistedState;
use crate::types::{BlockInput, MessageSink};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct NoteBridgeState {
    pub inbound: InboundState,
    pub outbound: OutboundState,
}

impl PersistedState for NoteBridgeState {
    const KIND: &'static str = "note bridge";
}

/// An inbound and an outbound translator sharing the host's block clock.
///
/// The outbound frame counter restarts whenever the inbound side picks up a
/// fresh batch, so emitted messages are stamped relative to the same block.
#[derive(Debug, Clone, Default)]
pub struct NoteBridge {
    inbound: InboundTranslator,
    outbound: OutboundTranslator,
}

impl NoteBridge {
    pub fn new(inbound: InboundTranslator, outbound: OutboundTranslator) -> Self {
        Self { inbound, outbound }
    }

    pub fn inbound(&self) -> &InboundTranslator {
        &self.inbound
    }

    pub fn inbound_mut(&mut self) -> &mut InboundTranslator {
        &mut self.inbound
    }

    pub fn outbound(&self) -> &OutboundTranslator {
        &self.outbound
    }

    pub fn outbound_mut(&mut self) -> &mut OutboundTranslator {
        &mut self.outbound
    }

    pub fn process(
        &mut self,
        args: &ProcessArgs,
        input: BlockInput<'_>,
        cv: &OutboundInputs,
        sink: &mut impl MessageSink,
    ) -> &InboundOutputs {
        profiling::scope!("note_bridge_process");

        let block_changed = self.inbound.process_block(args, input);
        self.outbound.advance_frame(block_changed);
        self.outbound.process_inputs(cv, sink);
        self.inbound.outputs()
    }

    /// Silence both directions.
    pub fn panic(&mut self, sink: &mut impl MessageSink) {
        self.inbound.panic();
        self.outbound.panic(sink);
    }

    pub fn save_state(&self) -> NoteBridgeState {
        NoteBridgeState {
            inbound: self.inbound.save_state(),
            outbound: self.outbound.save_state(),
        }
    }

    pub fn load_state(&mut self, state: &NoteBridgeState) {
        self.inbound.load_state(&state.inbound);
        self.outbound.load_state(&state.outbound);
    }
}
