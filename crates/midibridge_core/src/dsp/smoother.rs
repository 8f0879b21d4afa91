/// Single-pole low-pass filter.
///
/// `out` moves toward the target with time constant `tau`. When an update no
/// longer changes `out` (float underflow near the target) the output snaps to
/// the target, so a converged filter reports the target exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialFilter {
    pub out: f32,
    lambda: f32,
}

impl Default for ExponentialFilter {
    fn default() -> Self {
        Self::with_tau(super::SMOOTHING_TAU)
    }
}

impl ExponentialFilter {
    pub fn with_tau(tau: f32) -> Self {
        let mut filter = Self {
            out: 0.0,
            lambda: 0.0,
        };
        filter.set_tau(tau);
        filter
    }

    pub fn set_tau(&mut self, tau: f32) {
        self.lambda = if tau > 0.0 { 1.0 / tau } else { f32::INFINITY };
    }

    pub fn tau(&self) -> f32 {
        1.0 / self.lambda
    }

    /// Step toward `target` by `delta_time` seconds and return the new output.
    pub fn process(&mut self, delta_time: f32, target: f32) -> f32 {
        let step = (self.lambda * delta_time).min(1.0);
        let y = self.out + (target - self.out) * step;
        self.out = if y == self.out { target } else { y };
        self.out
    }

    /// Jump straight to `value` without ramping.
    pub fn snap(&mut self, value: f32) {
        self.out = value;
    }

    pub fn reset(&mut self) {
        self.out = 0.0;
    }
}
