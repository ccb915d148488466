use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::features::FeatureError;

/// Sample rate every clip is converted to before feature extraction
pub const TARGET_SAMPLE_RATE: u32 = 22050;

/// Input chunk size fed to the FFT resampler
const CHUNK_FRAMES: usize = 1024;

/// Resample a whole mono buffer from `from_rate` to `to_rate`
///
/// The resampler's output delay is trimmed and the result is cut to
/// `ceil(len * to_rate / from_rate)` samples, so the output lines up with the
/// input in time.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, FeatureError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(FeatureError::Resample(format!(
            "invalid sample rates {} -> {}",
            from_rate, to_rate
        )));
    }

    debug!(
        "Resampling {} samples: {} Hz -> {} Hz",
        samples.len(),
        from_rate,
        to_rate
    );

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        2, // sub_chunks for quality
        1, // mono
    )
    .map_err(|e| FeatureError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let mut output_buffer = resampler.output_buffer_allocate(true);
    let mut output: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK_FRAMES);

    // Full chunks
    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let end = pos + resampler.input_frames_next();
        let input = [&samples[pos..end]];
        let (consumed, produced) = resampler
            .process_into_buffer(&input[..], &mut output_buffer, None)
            .map_err(|e| FeatureError::Resample(e.to_string()))?;
        pos += consumed;
        output.extend_from_slice(&output_buffer[0][..produced]);
    }

    // Remainder, zero-padded internally
    if pos < samples.len() {
        let input = [&samples[pos..]];
        let (_, produced) = resampler
            .process_partial_into_buffer(Some(&input[..]), &mut output_buffer, None)
            .map_err(|e| FeatureError::Resample(e.to_string()))?;
        output.extend_from_slice(&output_buffer[0][..produced]);
    }

    // Flush until the delayed tail is out
    while output.len() < delay + expected {
        let (_, produced) = resampler
            .process_partial_into_buffer(None::<&[&[f32]]>, &mut output_buffer, None)
            .map_err(|e| FeatureError::Resample(e.to_string()))?;
        if produced == 0 {
            break;
        }
        output.extend_from_slice(&output_buffer[0][..produced]);
    }

    let end = (delay + expected).min(output.len());
    let start = delay.min(end);
    Ok(output[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_same_rate_is_identity() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&input, 22050, 22050).unwrap(), input);
    }

    #[test]
    fn test_resample_48k_to_22050_length() {
        let input = vec![0.0f32; 48000];
        let output = resample(&input, 48000, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(output.len(), 22050);
    }

    #[test]
    fn test_resample_16k_upsample_length() {
        // 0.5 s at 16 kHz, not a multiple of the chunk size
        let input = vec![0.0f32; 8000];
        let output = resample(&input, 16000, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(output.len(), (8000u64 * 22050).div_ceil(16000) as usize);
    }

    #[test]
    fn test_resample_keeps_tone_amplitude() {
        let input: Vec<f32> = (0..44100)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let output = resample(&input, 44100, TARGET_SAMPLE_RATE).unwrap();

        // Skip edges; the middle should carry the same RMS
        let mid = &output[2000..output.len() - 2000];
        let rms = (mid.iter().map(|s| s * s).sum::<f32>() / mid.len() as f32).sqrt();
        assert!((rms - 0.5 / 2f32.sqrt()).abs() < 0.02, "rms was {}", rms);
    }

    #[test]
    fn test_resample_is_deterministic() {
        let input: Vec<f32> = (0..5000).map(|i| ((i * 37) % 101) as f32 / 101.0 - 0.5).collect();
        let a = resample(&input, 48000, TARGET_SAMPLE_RATE).unwrap();
        let b = resample(&input, 48000, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample(&[0.0; 10], 0, 22050).is_err());
    }
}
