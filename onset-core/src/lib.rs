// onset-core/src/lib.rs

//! The core logic of the note onset detector.
//! This crate keeps a delayed monitor signal aligned with the live
//! microphone capture, validates per-band spectral peaks, and turns band
//! energy into discrete trigger events. It is completely headless
//! and contains no GUI code.

pub mod audio;
pub mod band;
pub mod config;
pub mod engine;
pub mod error;
pub mod fft;
pub mod peak;
pub mod pipeline;
pub mod range;
pub mod sink;
pub mod sync;
pub mod trigger;

pub use band::Band;
pub use config::SessionConfig;
pub use engine::{BandId, NoteOnsetEngine, TriggerEvent};
pub use error::{OnsetError, Result};
pub use pipeline::OnsetPipeline;
pub use trigger::NoteState;
