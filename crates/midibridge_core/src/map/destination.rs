//! Tunable values a map slot can drive.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Something outside the engine with a normalized 0..1 value.
///
/// Map controllers hold destinations weakly; a destination that has been
/// dropped simply stops receiving writes.
pub trait Destination: Send + Sync {
    /// Unbounded destinations have no meaningful 0..1 scale and are skipped.
    fn is_bounded(&self) -> bool;

    fn scaled_value(&self) -> f32;

    fn set_scaled_value(&self, value: f32);
}

/// Persistable address of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRef {
    pub module_id: i64,
    pub param_id: u32,
}

impl DestinationRef {
    pub fn new(module_id: i64, param_id: u32) -> Self {
        Self {
            module_id,
            param_id,
        }
    }
}

/// Turns persisted [`DestinationRef`]s back into live destinations on restore.
pub trait DestinationResolver {
    fn resolve(&self, reference: DestinationRef) -> Option<Arc<dyn Destination>>;
}

impl<D: Destination + 'static> DestinationResolver for HashMap<DestinationRef, Arc<D>> {
    fn resolve(&self, reference: DestinationRef) -> Option<Arc<dyn Destination>> {
        self.get(&reference)
            .map(|destination| Arc::clone(destination) as Arc<dyn Destination>)
    }
}

/// Resolver for state restored before any destination exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDestinations;

impl DestinationResolver for NoDestinations {
    fn resolve(&self, _reference: DestinationRef) -> Option<Arc<dyn Destination>> {
        None
    }
}

/// A plain ranged value, the destination most hosts need.
///
/// The value lives in an atomic as raw `f32` bits, so the audio thread can
/// write it while a host thread reads it without taking a lock.
#[derive(Debug)]
pub struct Parameter {
    value_bits: AtomicU32,
    min: f32,
    max: f32,
    bounded: bool,
}

impl Parameter {
    /// A parameter ranging over `min..=max`.
    pub fn new(min: f32, max: f32, value: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            value_bits: AtomicU32::new(value.clamp(min, max).to_bits()),
            min,
            max,
            bounded: true,
        }
    }

    /// A parameter with no range; map slots leave it alone.
    pub fn unbounded(value: f32) -> Self {
        Self {
            value_bits: AtomicU32::new(value.to_bits()),
            min: 0.0,
            max: 1.0,
            bounded: false,
        }
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.value_bits.load(Ordering::Relaxed))
    }

    pub fn set_value(&self, value: f32) {
        let value = if self.bounded {
            value.clamp(self.min, self.max)
        } else {
            value
        };
        self.value_bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Destination for Parameter {
    fn is_bounded(&self) -> bool {
        self.bounded && self.max > self.min
    }

    fn scaled_value(&self) -> f32 {
        if !self.is_bounded() {
            return 0.0;
        }
        (self.value() - self.min) / (self.max - self.min)
    }

    fn set_scaled_value(&self, value: f32) {
        if !self.is_bounded() {
            return;
        }
        self.set_value(self.min + value.clamp(0.0, 1.0) * (self.max - self.min));
    }
}
