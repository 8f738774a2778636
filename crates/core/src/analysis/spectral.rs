use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::SpectrumConfig, BeatscopeError, Result};

/// Windowed magnitude spectrum with per-bin exponential smoothing.
///
/// Each call to [`SpectralAnalyzer::analyze`] applies a Hann window to the
/// block and runs a real-to-complex FFT. The magnitudes of the first `N / 2`
/// bins are folded into a running linear average, and the published
/// spectrum is that average mapped from decibels onto `[0, 1]`.
pub struct SpectralAnalyzer {
    block_size: usize,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    magnitudes: Vec<f32>,
    spectrum: Vec<f32>,
    fft: FftResources,
}

impl SpectralAnalyzer {
    /// Plans an FFT for `block_size` samples.
    pub fn new(block_size: usize, config: &SpectrumConfig) -> Result<Self> {
        if block_size < 2 {
            return Err(BeatscopeError::InvalidInput(
                "spectral analysis requires blocks with at least two samples",
            ));
        }
        let config = config.clone().sanitized();

        Ok(Self {
            block_size,
            smoothing: config.smoothing,
            min_db: config.min_db,
            max_db: config.max_db,
            magnitudes: vec![0.0; block_size / 2],
            spectrum: vec![0.0; block_size / 2],
            fft: FftResources::new(block_size),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_bins(&self) -> usize {
        self.spectrum.len()
    }

    /// The normalised spectrum as of the last call to `analyze`.
    pub fn spectrum(&self) -> &[f32] {
        &self.spectrum
    }

    /// Smoothed linear magnitudes behind [`SpectralAnalyzer::spectrum`]. A
    /// full-scale sine centred on a bin reads 1.0 there.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn reset(&mut self) {
        self.magnitudes.fill(0.0);
        self.spectrum.fill(0.0);
    }

    /// Analyses one block and returns the updated smoothed spectrum.
    ///
    /// Short blocks are zero padded and long blocks truncated so the
    /// transform always runs over exactly `block_size` samples.
    pub fn analyze(&mut self, samples: &[f32]) -> Result<&[f32]> {
        let fft = &mut self.fft;

        for (index, slot) in fft.input.iter_mut().enumerate() {
            let sample = samples.get(index).copied().unwrap_or(0.0);
            *slot = sample * fft.window[index];
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.output, &mut fft.scratch)
            .map_err(|err| BeatscopeError::msg(format!("fft failed: {err}")))?;

        // The average runs on linear magnitudes; only the published value is
        // mapped through decibels.
        let keep = 1.0 - self.smoothing;
        for (bin, (smoothed, value)) in self
            .magnitudes
            .iter_mut()
            .zip(self.spectrum.iter_mut())
            .enumerate()
        {
            let magnitude = fft.output[bin].norm() * fft.scale;
            let magnitude = if magnitude.is_finite() { magnitude } else { 0.0 };
            *smoothed = *smoothed * keep + magnitude * self.smoothing;
            *value = normalized_level(*smoothed, self.min_db, self.max_db);
        }

        Ok(&self.spectrum)
    }
}

impl fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("block_size", &self.block_size)
            .field("smoothing", &self.smoothing)
            .field("range_db", &(self.min_db..self.max_db))
            .field("bins", &self.spectrum.len())
            .finish()
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    /// Converts raw FFT magnitudes into sine amplitudes, compensating for the
    /// coherent gain of the window.
    scale: f32,
    scratch: Vec<Complex32>,
    output: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let window: Vec<f32> = (0..size).map(|i| hann_value(i, size)).collect();
        let window_sum: f32 = window.iter().sum();
        let scale = if window_sum > f32::EPSILON {
            2.0 / window_sum
        } else {
            0.0
        };

        Self {
            scratch: plan.make_scratch_vec(),
            output: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
            window,
            scale,
        }
    }
}

/// Maps a linear magnitude onto `[0, 1]` across `min_db..max_db`. Zero maps
/// to exactly 0.
pub fn normalized_level(magnitude: f32, min_db: f32, max_db: f32) -> f32 {
    if magnitude.is_nan() || magnitude <= 0.0 {
        return 0.0;
    }

    let db = 20.0 * magnitude.log10();
    ((db - min_db) / (max_db - min_db)).clamp(0.0, 1.0)
}

/// Symmetric Hann window: `0.5 * (1 - cos(2πi / (N - 1)))`.
pub fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 * (1.0 - ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(bin: usize, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / len as f32).sin())
            .collect()
    }

    fn analyzer(block_size: usize, smoothing: f32) -> SpectralAnalyzer {
        let config = SpectrumConfig {
            smoothing,
            ..Default::default()
        };
        SpectralAnalyzer::new(block_size, &config).unwrap()
    }

    #[test]
    fn hann_window_is_zero_at_edges_and_one_in_the_middle() {
        let size = 1025;
        assert!(hann_value(0, size).abs() < 1e-6);
        assert!(hann_value(size - 1, size).abs() < 1e-6);
        assert!((hann_value(size / 2, size) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_degenerate_block_sizes() {
        assert!(SpectralAnalyzer::new(1, &SpectrumConfig::default()).is_err());
    }

    #[test]
    fn silence_produces_zero_spectrum() {
        let mut analyzer = analyzer(1024, 0.2);
        let spectrum = analyzer.analyze(&[0.0; 1024]).unwrap();
        assert_eq!(spectrum.len(), 512);
        assert!(spectrum.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn levels_map_decibels_onto_unit_range() {
        assert_eq!(normalized_level(0.0, -100.0, -30.0), 0.0);
        assert_eq!(normalized_level(-1.0, -100.0, -30.0), 0.0);
        assert_eq!(normalized_level(f32::NAN, -100.0, -30.0), 0.0);
        assert_eq!(normalized_level(1.0e-6, -100.0, -30.0), 0.0);
        assert_eq!(normalized_level(1.0, -100.0, -30.0), 1.0);

        let mid = 10.0_f32.powf(-65.0 / 20.0);
        assert!((normalized_level(mid, -100.0, -30.0) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn sine_peaks_at_its_bin_with_normalised_amplitude() {
        let mut analyzer = analyzer(1024, 1.0);
        analyzer.analyze(&sine(32, 1.0, 1024)).unwrap();
        let magnitudes = analyzer.magnitudes();

        let (peak, value) = magnitudes
            .iter()
            .enumerate()
            .fold((0, 0.0_f32), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
        assert_eq!(peak, 32);
        assert!((value - 1.0).abs() < 0.05, "peak amplitude was {value}");
        assert_eq!(analyzer.spectrum()[32], 1.0);
        assert!(analyzer.spectrum().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn smoothing_blends_with_previous_tick() {
        let mut analyzer = analyzer(256, 0.2);
        let tone = sine(8, 1.0, 256);
        analyzer.analyze(&tone).unwrap();
        let first = analyzer.magnitudes()[8];
        analyzer.analyze(&tone).unwrap();
        let second = analyzer.magnitudes()[8];
        let raw = first / 0.2;
        assert!((second - (first * 0.8 + raw * 0.2)).abs() < 1e-4);

        // Silence decays toward zero instead of resetting.
        analyzer.analyze(&[0.0; 256]).unwrap();
        let decayed = analyzer.magnitudes()[8];
        assert!((decayed - second * 0.8).abs() < 1e-4);
        assert_eq!(
            analyzer.spectrum()[8],
            normalized_level(decayed, -100.0, -30.0)
        );
    }

    #[test]
    fn sound_fades_to_exact_silence() {
        let mut analyzer = analyzer(256, 0.2);
        for _ in 0..3 {
            analyzer.analyze(&sine(8, 1.0, 256)).unwrap();
        }
        assert!(analyzer.spectrum()[8] > 0.0);

        for _ in 0..60 {
            analyzer.analyze(&[0.0; 256]).unwrap();
        }
        assert!(analyzer.spectrum().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn short_blocks_are_zero_padded() {
        let mut analyzer = analyzer(64, 0.2);
        let spectrum = analyzer.analyze(&[0.5; 10]).unwrap();
        assert_eq!(spectrum.len(), 32);
    }

    #[test]
    fn reset_clears_both_views() {
        let mut analyzer = analyzer(64, 0.2);
        analyzer.analyze(&sine(4, 0.5, 64)).unwrap();
        analyzer.reset();
        assert!(analyzer.magnitudes().iter().all(|v| *v == 0.0));
        assert!(analyzer.spectrum().iter().all(|v| *v == 0.0));
    }
}
