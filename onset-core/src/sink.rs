//! # Trigger Log
//!
//! Records triggered notes and renders them as a compact transcript: the
//! first note as `"C, "`, every later one as `"{delta_ms}; D, "`, where the
//! delta is the time since the previous trigger. The transcript can be
//! pasted back in to replay or annotate a performance.

use std::fmt::Write;

/// A single recorded trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedTrigger {
    pub caption: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerLog {
    entries: Vec<LoggedTrigger>,
    transcript: String,
}

impl TriggerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, caption: &str, timestamp_ms: u64) {
        match self.entries.last() {
            None => {
                let _ = write!(self.transcript, "{}, ", caption);
            }
            Some(previous) => {
                let delta = timestamp_ms.saturating_sub(previous.timestamp_ms);
                let _ = write!(self.transcript, "{}; {}, ", delta, caption);
            }
        }
        self.entries.push(LoggedTrigger {
            caption: caption.to_string(),
            timestamp_ms,
        });
    }

    pub fn entries(&self) -> &[LoggedTrigger] {
        &self.entries
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.transcript.clear();
    }
}
