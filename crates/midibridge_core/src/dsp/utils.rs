/// Map a value from one range to another. If the input range is degenerate, returns `y0`.
pub fn map_range(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    let denom = x1 - x0;
    if denom.abs() < f32::EPSILON {
        return y0;
    }
    (x - x0) * (y1 - y0) / denom + y0
}

/// 7-bit MIDI value to a 0..`full_scale` voltage.
pub fn midi_to_volts(value: u8, full_scale: f32) -> f32 {
    map_range(value.min(127) as f32, 0.0, 127.0, 0.0, full_scale)
}

/// 0..`full_scale` voltage to a 7-bit MIDI value, rounded and clamped.
pub fn volts_to_midi(volts: f32, full_scale: f32) -> u8 {
    let value = (volts / full_scale * 127.0).round();
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 127.0) as u8
}

/// 1V/octave pitch (0V = C4 = MIDI 60) to the nearest MIDI note.
pub fn voct_to_note(volts: f32) -> u8 {
    let note = (volts * 12.0 + 60.0).round();
    if note.is_nan() {
        return 60;
    }
    note.clamp(0.0, 127.0) as u8
}

/// MIDI note to 1V/octave pitch (0V = C4 = MIDI 60).
pub fn note_to_voct(note: u8) -> f32 {
    (note as f32 - 60.0) / 12.0
}

/// 14-bit pitch wheel to -1..1, center 0x2000.
pub fn pitch_wheel_to_bipolar(value: u16) -> f32 {
    ((value as i32 - 8192) as f32 / 8191.0).clamp(-1.0, 1.0)
}

/// -5..5V to a 14-bit pitch wheel value.
pub fn volts_to_pitch_wheel(volts: f32) -> u16 {
    let value = ((volts + 5.0) / 10.0 * 16384.0).round();
    if value.is_nan() {
        return 0x2000;
    }
    value.clamp(0.0, 16383.0) as u16
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchmittState {
    Low,
    High,
    Uninitialized,
}

/// Reusable Schmitt trigger with hysteresis
#[derive(Debug, Clone, Copy)]
pub struct SchmittTrigger {
    pub state: SchmittState,
    low_threshold: f32,
    high_threshold: f32,
}

impl SchmittTrigger {
    pub fn new(low_threshold: f32, high_threshold: f32) -> Self {
        Self {
            state: SchmittState::Uninitialized,
            low_threshold,
            high_threshold,
        }
    }

    /// Returns true if it toggled from low to high
    pub fn process(&mut self, input: f32) -> bool {
        match self.state {
            SchmittState::Uninitialized => {
                // a signal that is already high at startup is not an edge
                self.state = if input >= self.high_threshold {
                    SchmittState::High
                } else {
                    SchmittState::Low
                };
            }
            SchmittState::High => {
                if input <= self.low_threshold {
                    self.state = SchmittState::Low;
                }
            }
            SchmittState::Low => {
                if input >= self.high_threshold {
                    self.state = SchmittState::High;
                    return true;
                }
            }
        }

        false
    }

    pub fn state(&self) -> SchmittState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = SchmittState::Uninitialized;
    }
}

impl Default for SchmittTrigger {
    /// Trigger-input thresholds: rises at 1V, falls at 0.1V.
    fn default() -> Self {
        Self::new(0.1, 1.0)
    }
}

/// Counts calls and fires once every `division` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDivider {
    clock: u32,
    division: u32,
}

impl ClockDivider {
    pub fn new(division: u32) -> Self {
        Self {
            clock: 0,
            division: division.max(1),
        }
    }

    pub fn division(&self) -> u32 {
        self.division
    }

    pub fn process(&mut self) -> bool {
        self.clock += 1;
        if self.clock >= self.division {
            self.clock = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.clock = 0;
    }
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Accumulates elapsed time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    pub time: f32,
}

impl Timer {
    pub fn process(&mut self, delta_time: f32) -> f32 {
        self.time += delta_time;
        self.time
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }
}
