//! Learn sessions and the per-block apply pass shared by every map.

use std::fmt;
use std::sync::{Arc, Weak};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::destination::{Destination, DestinationRef, DestinationResolver};
use crate::dsp::ExponentialFilter;
use crate::state::PersistedState;

/// Number of distinct source ids (CC numbers or host parameter indices).
pub const SOURCE_COUNT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnState {
    #[default]
    Idle,
    Learning(usize),
}

/// One persisted slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct MapSlotState {
    pub source: Option<u8>,
    pub destination: Option<DestinationRef>,
    pub inverted: bool,
    pub smooth: bool,
}

impl Default for MapSlotState {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            inverted: false,
            smooth: true,
        }
    }
}

/// Slots up to the active length, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct MapState {
    pub maps: Vec<MapSlotState>,
}

impl PersistedState for MapState {
    const KIND: &'static str = "map";
}

#[derive(Clone)]
struct Binding {
    reference: DestinationRef,
    handle: Weak<dyn Destination>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("reference", &self.reference)
            .field("live", &(self.handle.strong_count() > 0))
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    source: Option<u8>,
    destination: Option<Binding>,
    inverted: bool,
    smooth: bool,
    filter: ExponentialFilter,
    filter_initialized: bool,
    /// The destination already holds the current target
    value_reached: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            inverted: false,
            smooth: true,
            filter: ExponentialFilter::default(),
            filter_initialized: false,
            value_reached: false,
        }
    }
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.source.is_none() && self.destination.is_none()
    }

    fn is_complete(&self) -> bool {
        self.source.is_some() && self.destination.is_some()
    }

    fn rebind(&mut self, reached: bool) {
        self.filter.reset();
        self.filter_initialized = false;
        self.value_reached = reached;
    }
}

/// Binds up to `N` numbered slots, each pairing a source id with a weakly
/// held destination.
///
/// Learning works like a two-field form: while a slot is learning, the next
/// distinct source observation fills in its source and the next destination
/// pick fills in its destination. Once both are in, the session moves on to
/// the next incomplete slot.
#[derive(Debug, Clone)]
pub struct MapController<const N: usize> {
    slots: [Slot; N],
    active_len: usize,
    learn: LearnState,
    learned_source: bool,
    learned_destination: bool,
    /// Last observed normalized value per source id
    values: [Option<f32>; SOURCE_COUNT],
    /// Newly bound slots leave the destination alone until the source moves
    wait_for_source_change: bool,
}

impl<const N: usize> Default for MapController<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MapController<N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::default()),
            active_len: N.min(1),
            learn: LearnState::Idle,
            learned_source: false,
            learned_destination: false,
            values: [None; SOURCE_COUNT],
            wait_for_source_change: false,
        }
    }

    /// A controller whose freshly bound slots do not write until their
    /// source changes.
    pub fn waiting_for_source_change() -> Self {
        Self {
            wait_for_source_change: true,
            ..Self::new()
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Slots worth showing: the last non-empty one plus one empty slot.
    pub fn active_len(&self) -> usize {
        self.active_len
    }

    pub fn learn_state(&self) -> LearnState {
        self.learn
    }

    pub fn source(&self, slot: usize) -> Option<u8> {
        self.slots.get(slot)?.source
    }

    pub fn destination(&self, slot: usize) -> Option<DestinationRef> {
        Some(self.slots.get(slot)?.destination.as_ref()?.reference)
    }

    pub fn inverted(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.inverted)
    }

    pub fn smooth(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.smooth)
    }

    /// Last observed value of `source`, normalized to 0..1.
    pub fn source_value(&self, source: u8) -> Option<f32> {
        self.values.get(source as usize).copied().flatten()
    }

    pub fn set_inverted(&mut self, slot: usize, inverted: bool) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.inverted = inverted;
            s.value_reached = false;
        }
    }

    pub fn set_smooth(&mut self, slot: usize, smooth: bool) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.smooth = smooth;
        }
    }

    /// Assign a source directly, outside of a learn session.
    pub fn set_source(&mut self, slot: usize, source: Option<u8>) {
        let reached = self.wait_for_source_change;
        if let Some(s) = self.slots.get_mut(slot) {
            s.source = source.filter(|&id| (id as usize) < SOURCE_COUNT);
            s.rebind(reached);
        }
        self.update_active_len();
    }

    /// Assign a destination directly, outside of a learn session.
    pub fn set_destination(
        &mut self,
        slot: usize,
        reference: DestinationRef,
        destination: &Arc<dyn Destination>,
    ) {
        let reached = self.wait_for_source_change;
        if let Some(s) = self.slots.get_mut(slot) {
            s.destination = Some(Binding {
                reference,
                handle: Arc::downgrade(destination),
            });
            s.rebind(reached);
        }
        self.update_active_len();
    }

    /// Start learning into `slot`. Its source is cleared, its destination kept.
    pub fn enable_learn(&mut self, slot: usize) {
        if slot >= N {
            return;
        }
        self.learn = LearnState::Learning(slot);
        self.learned_source = false;
        self.learned_destination = false;
        self.slots[slot].source = None;
    }

    pub fn disable_learn(&mut self, slot: usize) {
        if self.learn == LearnState::Learning(slot) {
            self.learn = LearnState::Idle;
        }
    }

    /// Record a source value. While learning, a value that differs from the
    /// last one seen for this source binds it to the learning slot. Returns
    /// whether the source was learned.
    pub fn observe(&mut self, source: u8, value: f32) -> bool {
        let id = source as usize;
        if id >= SOURCE_COUNT {
            return false;
        }
        let changed = self.values[id] != Some(value);

        let mut learned = false;
        if let LearnState::Learning(slot) = self.learn {
            if changed {
                self.slots[slot].source = Some(source);
                self.slots[slot].rebind(self.wait_for_source_change);
                self.learned_source = true;
                learned = true;
                self.commit_learn();
                self.update_active_len();
            }
        }

        if changed {
            self.values[id] = Some(value);
            for slot in self.slots.iter_mut().filter(|s| s.source == Some(source)) {
                slot.value_reached = false;
            }
        }
        learned
    }

    /// Record a source value without learning or re-arming any slot.
    pub fn prime(&mut self, source: u8, value: f32) {
        if let Some(v) = self.values.get_mut(source as usize) {
            *v = Some(value);
        }
    }

    /// Bind the learning slot to `destination`. Returns whether a slot was
    /// learning.
    pub fn learn_destination(
        &mut self,
        reference: DestinationRef,
        destination: &Arc<dyn Destination>,
    ) -> bool {
        let LearnState::Learning(slot) = self.learn else {
            return false;
        };
        let s = &mut self.slots[slot];
        s.destination = Some(Binding {
            reference,
            handle: Arc::downgrade(destination),
        });
        s.rebind(self.wait_for_source_change);
        self.learned_destination = true;
        self.commit_learn();
        self.update_active_len();
        true
    }

    fn commit_learn(&mut self) {
        let LearnState::Learning(slot) = self.learn else {
            return;
        };
        if !(self.learned_source && self.learned_destination) {
            return;
        }
        self.learned_source = false;
        self.learned_destination = false;
        tracing::debug!(
            slot,
            source = ?self.slots[slot].source,
            destination = ?self.destination(slot),
            "map slot committed"
        );

        self.learn = (slot + 1..N)
            .find(|&next| !self.slots[next].is_complete())
            .map_or(LearnState::Idle, LearnState::Learning);
    }

    /// Stop learning and wipe `slot`.
    pub fn clear_map(&mut self, slot: usize) {
        self.learn = LearnState::Idle;
        if let Some(s) = self.slots.get_mut(slot) {
            *s = Slot::default();
        }
        self.update_active_len();
    }

    pub fn clear_all(&mut self) {
        self.learn = LearnState::Idle;
        self.learned_source = false;
        self.learned_destination = false;
        for s in &mut self.slots {
            *s = Slot::default();
        }
        self.update_active_len();
    }

    fn update_active_len(&mut self) {
        let used = self
            .slots
            .iter()
            .rposition(|s| !s.is_empty())
            .map_or(0, |last| last + 1);
        self.active_len = (used + 1).min(N);
    }

    /// Push source values into live bounded destinations, `delta_time`
    /// seconds after the previous apply.
    ///
    /// A slot first adopts its destination's current value, so binding
    /// never causes a jump by itself.
    pub fn apply(&mut self, delta_time: f32) {
        profiling::scope!("map_apply");

        for slot in &mut self.slots[..self.active_len] {
            let Some(source) = slot.source else {
                continue;
            };
            let Some(destination) = slot.destination.as_ref().and_then(|b| b.handle.upgrade())
            else {
                continue;
            };
            if !destination.is_bounded() {
                continue;
            }
            if !slot.filter_initialized {
                slot.filter.snap(destination.scaled_value());
                slot.filter_initialized = true;
                continue;
            }
            if slot.value_reached {
                continue;
            }
            let Some(raw) = self.values[source as usize] else {
                continue;
            };

            let target = if slot.inverted { 1.0 - raw } else { raw };
            // a full-range step is a button, not a knob
            if slot.smooth && (slot.filter.out - target).abs() < 1.0 {
                slot.filter.process(delta_time, target);
            } else {
                slot.filter.snap(target);
            }
            destination.set_scaled_value(slot.filter.out);
            if slot.filter.out == target {
                slot.value_reached = true;
            }
        }
    }

    pub fn save_state(&self) -> MapState {
        let maps = self.slots[..self.active_len]
            .iter()
            .map(|s| MapSlotState {
                source: s.source,
                destination: s.destination.as_ref().map(|b| b.reference),
                inverted: s.inverted,
                smooth: s.smooth,
            })
            .collect();
        MapState { maps }
    }

    /// Replace every slot with `state`, resolving destinations through
    /// `resolver`. Unresolvable destinations keep their reference but stay
    /// inert.
    pub fn load_state(&mut self, state: &MapState, resolver: &impl DestinationResolver) {
        self.clear_all();
        for (slot, saved) in self.slots.iter_mut().zip(&state.maps) {
            slot.source = saved.source.filter(|&id| (id as usize) < SOURCE_COUNT);
            slot.inverted = saved.inverted;
            slot.smooth = saved.smooth;
            slot.destination = saved.destination.map(|reference| Binding {
                reference,
                handle: match resolver.resolve(reference) {
                    Some(destination) => Arc::downgrade(&destination),
                    None => dead_handle(),
                },
            });
            slot.rebind(self.wait_for_source_change);
        }
        if state.maps.len() > N {
            tracing::warn!(saved = state.maps.len(), capacity = N, "dropping map slots past capacity");
        }
        self.update_active_len();
        tracing::debug!(slots = self.active_len, "restored map state");
    }
}

/// A handle that never upgrades.
fn dead_handle() -> Weak<dyn Destination> {
    Weak::<super::destination::Parameter>::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::destination::{NoDestinations, Parameter};
    use std::collections::HashMap;

    const DT: f32 = 32.0 / 48000.0;

    fn param(value: f32) -> (Arc<Parameter>, Arc<dyn Destination>) {
        let p = Arc::new(Parameter::new(0.0, 1.0, value));
        let d: Arc<dyn Destination> = p.clone();
        (p, d)
    }

    #[test]
    fn test_commit_needs_source_and_destination() {
        let (_p, d) = param(0.0);
        let mut map = MapController::<8>::new();
        map.enable_learn(0);
        map.observe(7, 0.5);
        assert_eq!(map.learn_state(), LearnState::Learning(0));
        assert!(map.learn_destination(DestinationRef::new(1, 0), &d));
        assert_eq!(map.source(0), Some(7));
        assert_eq!(map.destination(0), Some(DestinationRef::new(1, 0)));
        assert_eq!(map.learn_state(), LearnState::Learning(1));
    }

    #[test]
    fn test_destination_first_then_source() {
        let (_p, d) = param(0.0);
        let mut map = MapController::<8>::new();
        map.enable_learn(3);
        map.learn_destination(DestinationRef::new(1, 0), &d);
        assert_eq!(map.learn_state(), LearnState::Learning(3));
        map.observe(9, 0.1);
        assert_eq!(map.source(3), Some(9));
        assert_eq!(map.learn_state(), LearnState::Learning(4));
        assert_eq!(map.active_len(), 5);
    }

    #[test]
    fn test_repeated_value_is_not_learned() {
        let mut map = MapController::<4>::new();
        map.observe(7, 0.5);
        map.enable_learn(0);
        assert!(!map.observe(7, 0.5));
        assert!(map.observe(7, 0.6));
    }

    #[test]
    fn test_last_slot_commit_goes_idle() {
        let (_p, d) = param(0.0);
        let mut map = MapController::<2>::new();
        map.enable_learn(1);
        map.observe(1, 1.0);
        map.learn_destination(DestinationRef::new(1, 0), &d);
        assert_eq!(map.learn_state(), LearnState::Idle);
        assert_eq!(map.active_len(), 2);
    }

    #[test]
    fn test_clear_map_compacts() {
        let (_p, d) = param(0.0);
        let mut map = MapController::<8>::new();
        assert_eq!(map.active_len(), 1);
        map.set_source(4, Some(1));
        map.set_destination(4, DestinationRef::new(1, 0), &d);
        assert_eq!(map.active_len(), 6);
        map.enable_learn(4);
        map.clear_map(4);
        assert_eq!(map.learn_state(), LearnState::Idle);
        assert_eq!(map.active_len(), 1);
    }

    #[test]
    fn test_apply_adopts_destination_first() {
        let (p, d) = param(0.3);
        let mut map = MapController::<4>::new();
        map.set_source(0, Some(1));
        map.set_destination(0, DestinationRef::new(1, 0), &d);
        map.set_smooth(0, false);
        map.observe(1, 0.8);
        map.apply(DT);
        assert_eq!(p.value(), 0.3);
        map.apply(DT);
        assert!((p.value() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_value_reached_skips_writes_until_source_moves() {
        let (p, d) = param(0.0);
        let mut map = MapController::<4>::new();
        map.set_source(0, Some(1));
        map.set_destination(0, DestinationRef::new(1, 0), &d);
        map.set_smooth(0, false);
        map.observe(1, 0.5);
        map.apply(DT);
        map.apply(DT);
        assert_eq!(p.value(), 0.5);

        // moved elsewhere by hand: the map does not fight back
        p.set_value(0.1);
        map.apply(DT);
        assert_eq!(p.value(), 0.1);

        map.observe(1, 0.6);
        map.apply(DT);
        assert!((p.value() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_inverted() {
        let (p, d) = param(0.0);
        let mut map = MapController::<4>::new();
        map.set_source(0, Some(1));
        map.set_destination(0, DestinationRef::new(1, 0), &d);
        map.set_smooth(0, false);
        map.set_inverted(0, true);
        map.observe(1, 0.25);
        map.apply(DT);
        map.apply(DT);
        assert!((p.value() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_dropped_destination_is_inert() {
        let (p, d) = param(0.0);
        let mut map = MapController::<4>::new();
        map.set_source(0, Some(1));
        map.set_destination(0, DestinationRef::new(1, 0), &d);
        drop(d);
        drop(p);
        map.observe(1, 0.5);
        map.apply(DT);
        map.apply(DT);
        assert_eq!(map.destination(0), Some(DestinationRef::new(1, 0)));
    }

    #[test]
    fn test_unbounded_destination_is_skipped() {
        let p = Arc::new(Parameter::unbounded(3.0));
        let d: Arc<dyn Destination> = p.clone();
        let mut map = MapController::<4>::new();
        map.set_source(0, Some(1));
        map.set_destination(0, DestinationRef::new(1, 0), &d);
        map.observe(1, 0.5);
        map.apply(DT);
        map.apply(DT);
        assert_eq!(p.value(), 3.0);
    }

    #[test]
    fn test_state_round_trip_resolves_destinations() {
        let (p, d) = param(0.0);
        let reference = DestinationRef::new(12, 3);
        let mut map = MapController::<8>::new();
        map.set_source(1, Some(20));
        map.set_destination(1, reference, &d);
        map.set_inverted(1, true);

        let json = map.save_state().to_json().unwrap();
        assert_eq!(json["maps"].as_array().unwrap().len(), 3);
        assert_eq!(json["maps"][1]["destination"]["moduleId"], 12);

        let mut registry = HashMap::new();
        registry.insert(reference, p.clone());
        let mut restored = MapController::<8>::new();
        restored.load_state(&MapState::from_json(&json).unwrap(), &registry);
        assert_eq!(restored.source(1), Some(20));
        assert!(restored.inverted(1));
        assert_eq!(restored.active_len(), 3);

        restored.set_smooth(1, false);
        restored.observe(20, 1.0);
        restored.apply(DT);
        restored.apply(DT);
        assert_eq!(p.value(), 0.0);

        let mut orphaned = MapController::<8>::new();
        orphaned.load_state(&MapState::from_json(&json).unwrap(), &NoDestinations);
        assert_eq!(orphaned.destination(1), Some(reference));
    }
}
