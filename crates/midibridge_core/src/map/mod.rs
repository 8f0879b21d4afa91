//! Learn/map: binding numbered host-side sources to external destinations.
//!
//! [`MapController`] owns the slot table and the learn state machine.
//! [`MidiMap`] feeds it from CC messages and [`ParameterMap`] from the host's
//! automatable parameters.

pub mod controller;
pub mod destination;
pub mod midi_map;
pub mod parameter_map;

pub use controller::{LearnState, MapController, MapSlotState, MapState};
pub use destination::{Destination, DestinationRef, DestinationResolver, NoDestinations, Parameter};
pub use midi_map::{MidiMap, MidiMapState};
pub use parameter_map::ParameterMap;
