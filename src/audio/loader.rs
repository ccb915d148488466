//! WAV file loading
//!
//! Decodes PCM (8/16/24/32-bit) and float WAV files with hound, downmixes to
//! mono and resamples to the requested rate.

use std::path::Path;
use tracing::debug;

use super::resampler::resample;
use crate::features::FeatureError;

/// Mono audio normalised to [-1, 1]
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Sample rate of the file before resampling
    pub source_sample_rate: u32,
    pub source_channels: u16,
}

impl AudioClip {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Load a WAV file as mono samples at `target_sr`
pub fn load_audio(path: &Path, target_sr: u32) -> Result<AudioClip, FeatureError> {
    if !path.exists() {
        return Err(FeatureError::NotFound(path.to_path_buf()));
    }

    let decode_err = |source| FeatureError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let reader = hound::WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let max_value = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
    };

    if samples.is_empty() {
        return Err(FeatureError::EmptyAudio(path.to_path_buf()));
    }

    let mono = downmix(samples, spec.channels);

    debug!(
        "Decoded {:?}: {} frames, {} Hz, {} channel(s)",
        path,
        mono.len(),
        spec.sample_rate,
        spec.channels
    );

    let samples = resample(&mono, spec.sample_rate, target_sr)?;

    Ok(AudioClip {
        samples,
        sample_rate: target_sr,
        source_sample_rate: spec.sample_rate,
        source_channels: spec.channels,
    })
}

/// Average interleaved channels into one
fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
