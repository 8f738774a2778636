//! Per-tick signal analysis: spectrum, band energies and tempo tracking.

use std::fmt;

mod bands;
mod beat;
mod frame;
mod spectral;

pub use bands::{band_ranges, Band, BandEnergy, BandEnergyExtractor};
pub use beat::{BeatDetector, TempoEstimate};
pub use frame::AnalysisFrame;
pub use spectral::{hann_value, normalized_level, SpectralAnalyzer};

use crate::{config::AppConfig, Result};

/// Synchronous analysis pipeline driven once per tick.
///
/// The engine never touches the capture buffer directly: callers hand it a
/// snapshot of one block and a timestamp, and get back a complete
/// [`AnalysisFrame`].
pub struct AnalysisEngine {
    block_size: usize,
    spectral: SpectralAnalyzer,
    bands: BandEnergyExtractor,
    beats: BeatDetector,
    ticks: u64,
}

impl AnalysisEngine {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let config = config.clone().sanitized();
        let block_size = config.audio.block_size;
        Ok(Self {
            block_size,
            spectral: SpectralAnalyzer::new(block_size, &config.spectrum)?,
            bands: BandEnergyExtractor::new(config.bands),
            beats: BeatDetector::new(config.beat),
            ticks: 0,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_bins(&self) -> usize {
        self.spectral.num_bins()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn spectral(&self) -> &SpectralAnalyzer {
        &self.spectral
    }

    pub fn beat_detector(&self) -> &BeatDetector {
        &self.beats
    }

    pub fn band_extractor_mut(&mut self) -> &mut BandEnergyExtractor {
        &mut self.bands
    }

    /// Runs one tick over `samples`.
    ///
    /// When `input_ready` is false the block is ignored and analysed as
    /// silence, so the spectrum decays instead of jumping to zero.
    pub fn process_block(
        &mut self,
        samples: &[f32],
        now_ms: f64,
        input_ready: bool,
    ) -> Result<AnalysisFrame> {
        let waveform = if input_ready {
            samples.to_vec()
        } else {
            vec![0.0; self.block_size]
        };

        let spectrum = self.spectral.analyze(&waveform)?.to_vec();
        let bands = self.bands.extract(&spectrum);
        let tempo = self.beats.update(bands.energy(Band::Bass), now_ms);
        let level = if spectrum.is_empty() {
            0.0
        } else {
            spectrum.iter().sum::<f32>() / spectrum.len() as f32
        };

        self.ticks += 1;
        if tempo.on_beat {
            tracing::trace!(time_ms = now_ms, bpm = tempo.bpm, "beat");
        }

        Ok(AnalysisFrame {
            time_ms: now_ms,
            spectrum,
            bands,
            tempo,
            level,
            input_ready,
            waveform,
        })
    }

    /// Clears the bounded beat histories, keeping the tempo estimate.
    pub fn clear_histories(&mut self) {
        self.beats.clear_histories();
    }

    /// Clears all accumulated state while preserving configuration.
    pub fn reset(&mut self) {
        self.spectral.reset();
        self.beats.reset();
        self.ticks = 0;
    }
}

impl fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("block_size", &self.block_size)
            .field("ticks", &self.ticks)
            .field("bpm", &self.beats.bpm())
            .finish()
    }
}
