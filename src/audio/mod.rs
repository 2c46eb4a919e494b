//! Optional playback sink built on cpal
//!
//! A convenience for clients that just want to hear the core: `AudioOutput`
//! opens the default output device and exposes a sink closure suitable for
//! `Apu::set_sink`. The core itself never depends on this module; it is
//! compiled only with the `audio` feature.

pub mod output;

pub use output::{AudioConfig, AudioOutput};
