//! Audio decoding and sample-rate conversion.

pub mod loader;
pub mod resampler;

pub use loader::{load_audio, AudioClip};
pub use resampler::{resample, TARGET_SAMPLE_RATE};
