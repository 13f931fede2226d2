//! # Note Trigger State Machine
//!
//! Turns the noisy per-band energy signal into discrete trigger events.
//!
//! ```text
//!  NotTriggered --(energy > threshold, interior peak)--> Rising  [trigger]
//!  Rising       --(energy < running max)---------------> Falling
//!  Falling      --(energy > min * retrigger level)-----> Rising  [trigger]
//!  any active   --(energy < threshold * 0.8)-----------> NotTriggered
//! ```
//!
//! The release check runs first and uses a lower threshold than the attack,
//! which keeps a level hovering around the threshold from chattering.

/// Fraction of the threshold below which an active band is released.
pub const RELEASE_RATIO: f32 = 0.8;

/// Detection state of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteState {
    #[default]
    NotTriggered,
    Rising,
    Falling,
}

impl NoteState {
    pub fn is_active(self) -> bool {
        self != NoteState::NotTriggered
    }
}

/// Per-tick input of the state machine for one band.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInput {
    /// Validated energy (`0.0` when the peak validator rejected the peak).
    pub energy: f32,
    /// Whether the band's peak was strictly interior this tick.
    pub interior: bool,
    pub threshold: f32,
    pub min_retrigger_level: f32,
    pub timestamp_ms: u64,
}

/// Mutable runtime state of one band.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandRuntimeState {
    pub state: NoteState,
    pub max_value_since_triggered: f32,
    pub min_value_since_triggered: f32,
    /// Ticks since the last (re)trigger. Reset on trigger and on release,
    /// frozen while not triggered. Only meant for fading visuals.
    pub frames_since_triggered: u32,
    pub last_triggered_timestamp: Option<u64>,
}

impl BandRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the band to `NotTriggered` and forgets all tracked levels.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advances the state machine by one tick.
    ///
    /// Rules are checked in a fixed order and only the first match applies.
    /// Comparisons are strict, so a `NaN` energy never triggers.
    ///
    /// # Returns
    /// `true` when the band (re)triggered on this tick.
    pub fn update(&mut self, input: TriggerInput) -> bool {
        let TriggerInput {
            energy,
            interior,
            threshold,
            min_retrigger_level,
            timestamp_ms,
        } = input;

        if self.state.is_active() {
            self.frames_since_triggered = self.frames_since_triggered.saturating_add(1);
        }

        let current = self.state;
        match current {
            state if state.is_active() && energy < threshold * RELEASE_RATIO => {
                self.state = NoteState::NotTriggered;
                self.frames_since_triggered = 0;
                false
            }
            NoteState::NotTriggered if energy > threshold && interior => {
                self.fire(energy, timestamp_ms);
                true
            }
            NoteState::Rising if energy > self.max_value_since_triggered => {
                self.max_value_since_triggered = energy;
                false
            }
            NoteState::Rising if energy < self.max_value_since_triggered => {
                self.state = NoteState::Falling;
                self.min_value_since_triggered = energy;
                false
            }
            NoteState::Falling if energy < self.min_value_since_triggered => {
                self.min_value_since_triggered = energy;
                false
            }
            NoteState::Falling
                if energy > self.min_value_since_triggered * min_retrigger_level && interior =>
            {
                self.fire(energy, timestamp_ms);
                true
            }
            _ => false,
        }
    }

    fn fire(&mut self, energy: f32, timestamp_ms: u64) {
        self.state = NoteState::Rising;
        self.max_value_since_triggered = energy;
        self.frames_since_triggered = 0;
        self.last_triggered_timestamp = Some(timestamp_ms);
    }
}
