//! MFCC extraction: log-mel (dB) followed by an orthonormal DCT-II.

use std::f64::consts::PI;

use super::config::MfccConfig;
use super::mel::{power_to_db, MelSpectrogram};
use super::FeatureError;

/// MFCC extractor with pre-computed mel filterbank and DCT basis
pub struct MfccExtractor {
    config: MfccConfig,
    mel: MelSpectrogram,
    dct: Vec<Vec<f64>>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig) -> Result<Self, FeatureError> {
        if config.n_mfcc == 0 || config.n_mfcc > config.mel.n_mels {
            return Err(FeatureError::InvalidConfig(format!(
                "n_mfcc={} must be in 1..={}",
                config.n_mfcc, config.mel.n_mels
            )));
        }

        let mel = MelSpectrogram::new(config.mel.clone())?;
        let dct = dct_ortho_basis(config.n_mfcc, config.mel.n_mels);

        Ok(Self { config, mel, dct })
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    /// MFCC matrix, `frames x n_mfcc`
    pub fn compute(&self, audio: &[f32]) -> Result<Vec<Vec<f64>>, FeatureError> {
        let mut log_mel = self.mel.compute(audio)?;

        for frame in log_mel.iter_mut() {
            for v in frame.iter_mut() {
                *v = power_to_db(*v, 1.0);
            }
        }

        if let Some(top_db) = self.config.top_db {
            let peak = log_mel
                .iter()
                .flatten()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            let floor = peak - top_db as f64;
            for v in log_mel.iter_mut().flatten() {
                *v = v.max(floor);
            }
        }

        Ok(log_mel
            .iter()
            .map(|frame| {
                self.dct
                    .iter()
                    .map(|basis| basis.iter().zip(frame).map(|(b, x)| b * x).sum())
                    .collect()
            })
            .collect())
    }

    /// Mean of each coefficient over all frames
    pub fn mean_mfcc(&self, audio: &[f32]) -> Result<Vec<f32>, FeatureError> {
        let mfcc = self.compute(audio)?;
        let n_frames = mfcc.len().max(1) as f64;

        let mut sums = vec![0.0f64; self.config.n_mfcc];
        for frame in &mfcc {
            for (sum, &c) in sums.iter_mut().zip(frame) {
                *sum += c;
            }
        }

        Ok(sums.into_iter().map(|s| (s / n_frames) as f32).collect())
    }
}

/// DCT-II basis with orthonormal scaling, `n_out x n_in`
fn dct_ortho_basis(n_out: usize, n_in: usize) -> Vec<Vec<f64>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dct_basis_is_orthonormal() {
        let basis = dct_ortho_basis(8, 8);
        for a in 0..8 {
            for b in 0..8 {
                let dot: f64 = basis[a].iter().zip(&basis[b]).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9, "<{}, {}> = {}", a, b, dot);
            }
        }
    }

    #[test]
    fn test_silence_mfcc() {
        // All-zero power hits the 1e-10 floor: -100 dB in every band.
        // Only c0 survives: -100 * sqrt(128).
        let extractor = MfccExtractor::new(MfccConfig::default()).unwrap();
        let mean = extractor.mean_mfcc(&vec![0.0; 22050]).unwrap();

        assert_eq!(mean.len(), 40);
        let c0 = -100.0 * 128f32.sqrt();
        assert!((mean[0] - c0).abs() < 1e-2, "c0 was {}", mean[0]);
        for &c in &mean[1..] {
            assert!(c.abs() < 1e-3);
        }
    }

    #[test]
    fn test_top_db_clips_dynamic_range() {
        // Impulse followed by silence: quiet frames are clipped at peak - 80 dB
        let extractor = MfccExtractor::new(MfccConfig::default()).unwrap();
        let mut audio = vec![0.0f32; 4096];
        audio[2048] = 1.0;
        let mfcc = extractor.compute(&audio).unwrap();

        let unclipped = MfccExtractor::new(MfccConfig {
            top_db: None,
            ..Default::default()
        })
        .unwrap()
        .compute(&audio)
        .unwrap();

        // The first frame sees only zeros; clipping raises its floor
        assert!(mfcc[0][0] > unclipped[0][0]);
    }

    #[test]
    fn test_tone_differs_from_silence() {
        let extractor = MfccExtractor::new(MfccConfig::default()).unwrap();
        let tone: Vec<f32> = (0..22050)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22050.0).sin() * 0.3)
            .collect();
        let silent = extractor.mean_mfcc(&vec![0.0; 22050]).unwrap();
        let voiced = extractor.mean_mfcc(&tone).unwrap();
        assert!(voiced[0] > silent[0]);
        assert!(voiced.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_invalid_n_mfcc() {
        let config = MfccConfig {
            n_mfcc: 200,
            ..Default::default()
        };
        assert!(MfccExtractor::new(config).is_err());
    }
}
