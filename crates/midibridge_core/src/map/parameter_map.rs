//! Map driven by the host's automatable parameters.

use super::controller::{MapController, MapState};
use super::destination::DestinationResolver;
use crate::ProcessArgs;

pub const PARAMETER_MAP_SLOTS: usize = 64;

/// Parameters the host exposes to the plugin.
pub const HOST_PARAMETER_COUNT: usize = 24;

/// Host parameters arrive on a 0..10 scale.
pub const HOST_PARAMETER_MAX: f32 = 10.0;

/// Host parameters only change between audio blocks, so this map runs once per
/// block, detected through the host's process counter.
///
/// Slots never move their destination on their own: a freshly bound or
/// restored slot waits until the host parameter actually changes.
#[derive(Debug, Clone)]
pub struct ParameterMap {
    controller: MapController<PARAMETER_MAP_SLOTS>,
    last_process_counter: u32,
    first_run: bool,
}

impl Default for ParameterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterMap {
    pub fn new() -> Self {
        Self {
            controller: MapController::waiting_for_source_change(),
            last_process_counter: 0,
            first_run: true,
        }
    }

    pub fn controller(&self) -> &MapController<PARAMETER_MAP_SLOTS> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut MapController<PARAMETER_MAP_SLOTS> {
        &mut self.controller
    }

    /// Run once per sample. Does nothing unless `process_counter` moved since
    /// the last call. Returns whether the block was processed.
    pub fn process(
        &mut self,
        args: &ProcessArgs,
        process_counter: u32,
        parameters: &[f32],
        buffer_size: usize,
    ) -> bool {
        if process_counter == self.last_process_counter {
            return false;
        }
        self.last_process_counter = process_counter;
        profiling::scope!("parameter_map_process");

        for (id, &value) in parameters.iter().take(HOST_PARAMETER_COUNT).enumerate() {
            let scaled = (value / HOST_PARAMETER_MAX).clamp(0.0, 1.0);
            if self.first_run {
                self.controller.prime(id as u8, scaled);
            } else if self.controller.observe(id as u8, scaled) {
                tracing::debug!(parameter = id, "parameter map learned host parameter");
            }
        }
        self.first_run = false;

        // one call covers a whole host buffer
        self.controller
            .apply(buffer_size as f32 / args.sample_rate);
        true
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn save_state(&self) -> MapState {
        self.controller.save_state()
    }

    pub fn load_state(&mut self, state: &MapState, resolver: &impl DestinationResolver) {
        self.controller.load_state(state, resolver);
        self.first_run = true;
    }
}
