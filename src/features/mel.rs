//! Mel power spectrogram.
//!
//! Centred STFT with a periodic Hann window and a Slaney-style mel filterbank
//! (Slaney mel scale, area-normalised triangles).

use realfft::{RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

use super::config::MelConfig;
use super::FeatureError;

/// Mel spectrogram generator with pre-computed filterbank and FFT plan
pub struct MelSpectrogram {
    config: MelConfig,
    fft: Arc<dyn RealToComplex<f64>>,
    filterbank: Vec<Vec<f64>>,
    window: Vec<f64>,
}

impl MelSpectrogram {
    /// Create a new mel spectrogram generator with the given configuration
    pub fn new(config: MelConfig) -> Result<Self, FeatureError> {
        if config.n_fft < 2 || config.hop_length == 0 || config.n_mels == 0 {
            return Err(FeatureError::InvalidConfig(format!(
                "n_fft={}, hop_length={}, n_mels={}",
                config.n_fft, config.hop_length, config.n_mels
            )));
        }

        let window = hann_window(config.n_fft);
        let filterbank = create_mel_filterbank(
            config.n_mels,
            config.n_fft,
            config.sample_rate as f64,
            config.fmin as f64,
            config.fmax_or_nyquist() as f64,
        );

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        Ok(Self {
            config,
            fft,
            filterbank,
            window,
        })
    }

    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    /// Number of frames a signal of `len` samples produces
    pub fn n_frames(&self, len: usize) -> usize {
        1 + len / self.config.hop_length
    }

    /// Compute the mel power spectrogram
    ///
    /// Returns `frames x n_mels`.
    pub fn compute(&self, audio: &[f32]) -> Result<Vec<Vec<f64>>, FeatureError> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let pad = n_fft / 2;

        // Zero-pad n_fft/2 on both sides so frame t is centred on sample t*hop
        let mut padded = vec![0.0f64; audio.len() + 2 * pad];
        for (dst, &src) in padded[pad..pad + audio.len()].iter_mut().zip(audio) {
            *dst = src as f64;
        }

        let n_frames = self.n_frames(audio.len());
        let mut fft_input = self.fft.make_input_vec();
        let mut fft_output = self.fft.make_output_vec();
        let mut power = vec![0.0f64; self.config.n_bins()];
        let mut mel_spec = Vec::with_capacity(n_frames);

        for frame_idx in 0..n_frames {
            let start = frame_idx * hop;
            for ((dst, &x), &w) in fft_input
                .iter_mut()
                .zip(&padded[start..start + n_fft])
                .zip(&self.window)
            {
                *dst = x * w;
            }

            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;

            for (p, c) in power.iter_mut().zip(&fft_output) {
                *p = c.re * c.re + c.im * c.im;
            }

            let mel_frame: Vec<f64> = self
                .filterbank
                .iter()
                .map(|filter| filter.iter().zip(&power).map(|(f, p)| f * p).sum())
                .collect();

            mel_spec.push(mel_frame);
        }

        Ok(mel_spec)
    }
}

/// Periodic Hann window
fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert frequency to the Slaney mel scale (linear below 1 kHz, log above)
fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert Slaney mel back to frequency
fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Create a mel filterbank matrix
///
/// Returns `n_mels` filters over `n_fft/2 + 1` bins, each triangle scaled by
/// `2 / (upper_edge - lower_edge)` so every band has equal area.
fn create_mel_filterbank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: f64,
    fmin: f64,
    fmax: f64,
) -> Vec<Vec<f64>> {
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let mel_f: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|i| {
            let lower_width = mel_f[i + 1] - mel_f[i];
            let upper_width = mel_f[i + 2] - mel_f[i + 1];
            let enorm = 2.0 / (mel_f[i + 2] - mel_f[i]);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - mel_f[i]) / lower_width;
                    let upper = (mel_f[i + 2] - f) / upper_width;
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Convert a power value to decibels, floored at `amin`
pub(crate) fn power_to_db(power: f64, reference: f64) -> f64 {
    const AMIN: f64 = 1e-10;
    10.0 * power.max(AMIN).log10() - 10.0 * reference.max(AMIN).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slaney_mel_scale() {
        assert!((hz_to_mel(0.0)).abs() < 1e-12);
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
        // Log region: 6400 Hz is exactly 27 steps above 1 kHz
        assert!((hz_to_mel(6400.0) - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_mel_to_hz_roundtrip() {
        for hz in [50.0, 500.0, 999.0, 1000.0, 2000.0, 8000.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((hz - back).abs() < 1e-6, "Roundtrip failed for {} Hz", hz);
        }
    }

    #[test]
    fn test_create_mel_filterbank() {
        let filterbank = create_mel_filterbank(128, 2048, 22050.0, 0.0, 11025.0);
        assert_eq!(filterbank.len(), 128);

        for filter in &filterbank {
            assert_eq!(filter.len(), 1025);
            assert!(filter.iter().all(|&w| w >= 0.0));
        }

        // Triangles are area-normalised: sum(w) * bin_width ~ 1 for wide bands
        let bin_hz = 22050.0 / 2048.0;
        let last: f64 = filterbank[127].iter().sum::<f64>() * bin_hz;
        assert!((last - 1.0).abs() < 0.05, "area was {}", last);
    }

    #[test]
    fn test_hann_window_periodic() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
        // Periodic: not symmetric at the last sample
        assert!(w[7] > 0.0);
    }

    #[test]
    fn test_frame_count_is_centred() {
        let mel = MelSpectrogram::new(MelConfig::default()).unwrap();
        let spec = mel.compute(&vec![0.0; 22050]).unwrap();
        assert_eq!(spec.len(), 1 + 22050 / 512);
        assert!(spec.iter().all(|frame| frame.len() == 128));
    }

    #[test]
    fn test_tone_energy_in_matching_band() {
        let config = MelConfig::default();
        let mel = MelSpectrogram::new(config.clone()).unwrap();
        let audio: Vec<f32> = (0..22050)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 22050.0).sin())
            .collect();
        let spec = mel.compute(&audio).unwrap();

        let middle = &spec[spec.len() / 2];
        let (peak_band, _) = middle
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });

        // 1 kHz sits at mel 15, i.e. around band 15 / (mel_max / 129)
        let mel_max = hz_to_mel(11025.0);
        let expected = (15.0 / mel_max * 129.0) as usize;
        assert!(
            (peak_band as i64 - expected as i64).abs() <= 2,
            "peak band {} expected near {}",
            peak_band,
            expected
        );
    }

    #[test]
    fn test_power_to_db() {
        assert!((power_to_db(1.0, 1.0)).abs() < 1e-12);
        assert!((power_to_db(100.0, 1.0) - 20.0).abs() < 1e-9);
        assert!((power_to_db(0.0, 1.0) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config() {
        let config = MelConfig {
            hop_length: 0,
            ..Default::default()
        };
        assert!(matches!(
            MelSpectrogram::new(config),
            Err(FeatureError::InvalidConfig(_))
        ));
    }
}
