//! Feature extraction for speech emotion recognition.
//!
//! An audio file becomes a fixed-length vector of 40 mean MFCC coefficients:
//! 1. Decode WAV, downmix to mono, resample to 22050 Hz
//! 2. Mel power spectrogram (n_fft 2048, hop 512, 128 bands)
//! 3. dB scale clipped to 80 dB below the peak, DCT-II, first 40 coefficients
//! 4. Average over frames

pub mod config;
pub mod mel;
pub mod mfcc;
pub mod overview;

pub use config::{MelConfig, MfccConfig, N_MFCC};
pub use mel::MelSpectrogram;
pub use mfcc::MfccExtractor;
pub use overview::{AudioOverview, OverviewConfig};

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::audio::load_audio;

/// Errors that can occur during feature extraction
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Audio file contains no samples: {0}")]
    EmptyAudio(PathBuf),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),
}

/// Mean MFCC vector of one audio file
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector(#[serde(with = "array_as_seq")] [f32; N_MFCC]);

impl FeatureVector {
    pub fn new(values: [f32; N_MFCC]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = FeatureError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        let len = values.len();
        let array: [f32; N_MFCC] = values.try_into().map_err(|_| {
            FeatureError::InvalidConfig(format!("expected {} coefficients, got {}", N_MFCC, len))
        })?;
        Ok(Self(array))
    }
}

mod array_as_seq {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values)
    }
}

/// Extract the 40-coefficient mean MFCC vector from an audio file
pub fn extract_features(path: &Path) -> Result<FeatureVector, FeatureError> {
    let extractor = MfccExtractor::new(MfccConfig::default())?;
    extract_with(&extractor, path)
}

/// Same as [`extract_features`] with a caller-owned extractor
pub fn extract_with(extractor: &MfccExtractor, path: &Path) -> Result<FeatureVector, FeatureError> {
    let clip = load_audio(path, extractor.config().mel.sample_rate)?;
    let mean = extractor.mean_mfcc(&clip.samples)?;

    debug!(
        "Extracted {} MFCCs from {:?} ({:.2}s)",
        mean.len(),
        path,
        clip.duration_secs()
    );

    FeatureVector::try_from(mean)
}
