//! Small realtime building blocks shared by every translator: one-shot
//! pulses, exponential smoothing, clock division and conversion helpers.

pub mod pulse;
pub mod smoother;
pub mod utils;

pub use pulse::PulseGenerator;
pub use smoother::ExponentialFilter;
pub use utils::{ClockDivider, SchmittTrigger, Timer};

/// Duration of trigger pulses (retrigger, start, stop, continue) in seconds.
pub const TRIGGER_PULSE_SECONDS: f32 = 1e-3;

/// Time constant used for wheel and CC smoothing, in seconds.
pub const SMOOTHING_TAU: f32 = 1.0 / 30.0;
