//! Waveform envelope and mel spectrogram for display.

use serde::Serialize;
use std::path::Path;

use super::config::MelConfig;
use super::mel::{power_to_db, MelSpectrogram};
use super::FeatureError;
use crate::audio::load_audio;

/// Display parameters
#[derive(Debug, Clone)]
pub struct OverviewConfig {
    pub mel: MelConfig,
    /// Maximum number of min/max buckets in the waveform envelope
    pub waveform_buckets: usize,
    pub top_db: f32,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            mel: MelConfig {
                n_mels: 64,
                ..MelConfig::default()
            },
            waveform_buckets: 1000,
            top_db: 80.0,
        }
    }
}

/// What a client needs to draw a waveform plot and a mel spectrogram image
#[derive(Debug, Clone, Serialize)]
pub struct AudioOverview {
    pub sample_rate: u32,
    pub duration_secs: f32,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    /// `(min, max)` per bucket, in time order
    pub waveform: Vec<(f32, f32)>,
    /// Seconds covered by one waveform bucket
    pub bucket_secs: f32,
    /// dB relative to the loudest bin, `[mel_band][frame]`, band 0 lowest
    pub mel_db: Vec<Vec<f32>>,
    pub hop_length: usize,
}

impl AudioOverview {
    pub fn from_file(path: &Path, config: &OverviewConfig) -> Result<Self, FeatureError> {
        let clip = load_audio(path, config.mel.sample_rate)?;
        let (waveform, bucket_len) = peak_envelope(&clip.samples, config.waveform_buckets);
        let mel_db = mel_db_ref_max(&clip.samples, &config.mel, config.top_db)?;

        Ok(Self {
            sample_rate: clip.sample_rate,
            duration_secs: clip.duration_secs(),
            source_sample_rate: clip.source_sample_rate,
            source_channels: clip.source_channels,
            waveform,
            bucket_secs: bucket_len as f32 / clip.sample_rate.max(1) as f32,
            mel_db,
            hop_length: config.mel.hop_length,
        })
    }
}

/// Min/max envelope with at most `max_buckets` buckets
fn peak_envelope(samples: &[f32], max_buckets: usize) -> (Vec<(f32, f32)>, usize) {
    if samples.is_empty() || max_buckets == 0 {
        return (Vec::new(), 0);
    }
    let bucket_len = samples.len().div_ceil(max_buckets);
    let envelope = samples
        .chunks(bucket_len)
        .map(|chunk| {
            chunk
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)))
        })
        .collect();
    (envelope, bucket_len)
}

/// Mel spectrogram in dB against its own maximum, transposed to bands x frames
fn mel_db_ref_max(
    samples: &[f32],
    config: &MelConfig,
    top_db: f32,
) -> Result<Vec<Vec<f32>>, FeatureError> {
    let mel = MelSpectrogram::new(config.clone())?;
    let spec = mel.compute(samples)?;

    let reference = spec.iter().flatten().copied().fold(0.0f64, f64::max);
    let db: Vec<Vec<f64>> = spec
        .iter()
        .map(|frame| frame.iter().map(|&p| power_to_db(p, reference)).collect())
        .collect();
    let peak = db.iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - top_db as f64;

    Ok((0..config.n_mels)
        .map(|band| db.iter().map(|frame| frame[band].max(floor) as f32).collect())
        .collect())
}
