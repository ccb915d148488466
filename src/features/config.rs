//! Configuration structures for MFCC / mel spectrogram extraction.

use serde::{Deserialize, Serialize};

use crate::audio::TARGET_SAMPLE_RATE;

/// Number of MFCC coefficients the emotion model consumes
pub const N_MFCC: usize = 40;

/// STFT + mel filterbank parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub fmin: f32,
    /// Upper band edge, Nyquist when unset
    pub fmax: Option<f32>,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            fmin: 0.0,
            fmax: None,
        }
    }
}

impl MelConfig {
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn fmax_or_nyquist(&self) -> f32 {
        self.fmax.unwrap_or(self.sample_rate as f32 / 2.0)
    }
}

/// MFCC parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfccConfig {
    pub mel: MelConfig,
    pub n_mfcc: usize,
    /// Dynamic range kept below the loudest bin, no clipping when unset
    pub top_db: Option<f32>,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            mel: MelConfig::default(),
            n_mfcc: N_MFCC,
            top_db: Some(80.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_model_input() {
        let config = MfccConfig::default();
        assert_eq!(config.n_mfcc, N_MFCC);
        assert_eq!(config.mel.sample_rate, 22050);
        assert_eq!(config.mel.n_bins(), 1025);
        assert_eq!(config.mel.fmax_or_nyquist(), 11025.0);
    }
}
