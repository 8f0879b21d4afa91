//! Hand-off of translated messages between adjacent processing units.
//!
//! A producing unit writes one block's worth of messages into its own
//! [`RelayMailbox`]; the unit next to it drains the mailbox at the start of
//! its next block and replays the batch from frame 0. Both sides watch the
//! identity of their neighbour and reset when it goes away or is swapped.

use arrayvec::ArrayVec;

use crate::ProcessArgs;
use crate::midi::{InboundOutputs, InboundTranslator, OutboundInputs, OutboundTranslator};
use crate::types::{MessageSink, TimestampedMessage};

/// Messages a mailbox holds per block.
pub const RELAY_CAPACITY: usize = 128;

/// Bounded single-producer mailbox. Writes past capacity are dropped and
/// counted.
#[derive(Debug, Clone, Default)]
pub struct RelayMailbox {
    messages: ArrayVec<TimestampedMessage, RELAY_CAPACITY>,
    dropped: u64,
}

impl RelayMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the mailbox is full and `message` was dropped.
    pub fn write(&mut self, message: TimestampedMessage) -> bool {
        if self.messages.try_push(message).is_ok() {
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    pub fn messages(&self) -> &[TimestampedMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total messages dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Empty the mailbox. Only the consuming side calls this.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl MessageSink for RelayMailbox {
    fn emit(&mut self, message: TimestampedMessage) -> bool {
        self.write(message)
    }
}

/// Identity of a neighbouring unit, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Unchanged,
    Attached,
    Detached,
    /// A different unit took the neighbour's place.
    Replaced,
}

/// Tracks which unit sits next to us.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighbourWatch {
    current: Option<UnitId>,
}

impl NeighbourWatch {
    pub fn current(&self) -> Option<UnitId> {
        self.current
    }

    pub fn observe(&mut self, neighbour: Option<UnitId>) -> Topology {
        let topology = match (self.current, neighbour) {
            (None, None) => Topology::Unchanged,
            (None, Some(_)) => Topology::Attached,
            (Some(_), None) => Topology::Detached,
            (Some(before), Some(now)) if before == now => Topology::Unchanged,
            (Some(_), Some(_)) => Topology::Replaced,
        };
        self.current = neighbour;
        topology
    }
}

/// Outbound translator whose messages go into a mailbox for the unit next
/// to it.
///
/// After attaching, nothing is written until the neighbour starts its next
/// block, so the first batch it drains is stamped against a whole block.
#[derive(Debug, Clone, Default)]
pub struct RelayProducer {
    outbound: OutboundTranslator,
    mailbox: RelayMailbox,
    watch: NeighbourWatch,
    /// Generation seen at attach time while waiting for the neighbour
    armed_at: Option<u64>,
}

impl RelayProducer {
    pub fn new(outbound: OutboundTranslator) -> Self {
        Self {
            outbound,
            ..Self::default()
        }
    }

    pub fn outbound(&self) -> &OutboundTranslator {
        &self.outbound
    }

    pub fn outbound_mut(&mut self) -> &mut OutboundTranslator {
        &mut self.outbound
    }

    pub fn mailbox(&self) -> &RelayMailbox {
        &self.mailbox
    }

    /// The neighbour drains through this.
    pub fn mailbox_mut(&mut self) -> &mut RelayMailbox {
        &mut self.mailbox
    }

    pub fn is_ready(&self) -> bool {
        self.watch.current().is_some() && self.armed_at.is_none()
    }

    /// Run one sample against the neighbour's block `generation`. Returns
    /// whether `inputs` were translated.
    pub fn process(
        &mut self,
        neighbour: Option<UnitId>,
        generation: u64,
        inputs: &OutboundInputs,
    ) -> bool {
        match self.watch.observe(neighbour) {
            Topology::Unchanged => {}
            Topology::Attached => {
                tracing::debug!(?neighbour, "relay producer attached");
                self.armed_at = Some(generation);
            }
            Topology::Detached => {
                tracing::debug!("relay producer lost its neighbour, resetting");
                self.reset();
                return false;
            }
            Topology::Replaced => {
                tracing::debug!(?neighbour, "relay producer neighbour replaced, resetting");
                self.reset();
                self.armed_at = Some(generation);
                return false;
            }
        }
        if neighbour.is_none() {
            return false;
        }
        if let Some(armed) = self.armed_at {
            if armed == generation {
                return false;
            }
            self.armed_at = None;
        }

        self.outbound.process(generation, inputs, &mut self.mailbox);
        true
    }

    /// Forget edge memory and anything not yet drained.
    pub fn reset(&mut self) {
        self.outbound.reset();
        self.mailbox.clear();
        self.armed_at = None;
    }
}

/// Inbound translator fed from the mailbox of the unit next to it.
#[derive(Debug, Clone, Default)]
pub struct RelayConsumer {
    inbound: InboundTranslator,
    watch: NeighbourWatch,
    last_generation: Option<u64>,
    delivered: u64,
}

impl RelayConsumer {
    pub fn new(inbound: InboundTranslator) -> Self {
        Self {
            inbound,
            ..Self::default()
        }
    }

    pub fn inbound(&self) -> &InboundTranslator {
        &self.inbound
    }

    pub fn inbound_mut(&mut self) -> &mut InboundTranslator {
        &mut self.inbound
    }

    /// Messages taken out of upstream mailboxes so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Run one sample of our own block `generation`. At the first sample of
    /// each block any pending upstream messages are copied out, the mailbox
    /// is emptied and playback restarts at frame 0.
    pub fn process(
        &mut self,
        args: &ProcessArgs,
        generation: u64,
        upstream: Option<(UnitId, &mut RelayMailbox)>,
    ) -> &InboundOutputs {
        let neighbour = upstream.as_ref().map(|(id, _)| *id);
        match self.watch.observe(neighbour) {
            Topology::Unchanged | Topology::Attached => {}
            Topology::Detached | Topology::Replaced => {
                tracing::debug!(?neighbour, "relay consumer upstream changed, resetting");
                self.reset();
                return self.inbound.outputs();
            }
        }
        let Some((_, mailbox)) = upstream else {
            return self.inbound.outputs();
        };

        if self.last_generation != Some(generation) {
            self.last_generation = Some(generation);
            if !mailbox.is_empty() {
                self.inbound.load(mailbox.messages());
                self.delivered += mailbox.len() as u64;
                mailbox.clear();
            }
        }
        self.inbound.process(args)
    }

    pub fn reset(&mut self) {
        self.inbound.reset();
        self.last_generation = None;
    }
}
