use serde::{Deserialize, Serialize};

use super::{Band, BandEnergy, TempoEstimate};

/// Immutable snapshot of everything the analysis produced on one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    /// Tick timestamp in milliseconds.
    pub time_ms: f64,
    /// Smoothed magnitudes, `block_size / 2` bins, lowest frequency first.
    pub spectrum: Vec<f32>,
    pub bands: BandEnergy,
    pub tempo: TempoEstimate,
    /// Mean of the whole spectrum.
    pub level: f32,
    pub input_ready: bool,
    /// The gained time-domain block the frame was computed from.
    #[serde(skip)]
    pub waveform: Vec<f32>,
}

impl AnalysisFrame {
    /// A silent frame for `bins` spectrum bins, used before the first tick.
    pub fn silent(bins: usize) -> Self {
        Self {
            spectrum: vec![0.0; bins],
            ..Default::default()
        }
    }

    pub fn bpm(&self) -> f32 {
        self.tempo.bpm
    }

    pub fn phase(&self) -> f32 {
        self.tempo.phase
    }

    pub fn on_beat(&self) -> bool {
        self.tempo.on_beat
    }

    pub fn band_energy(&self, band: Band) -> f32 {
        self.bands.energy(band)
    }

    pub fn band_trigger(&self, band: Band) -> bool {
        self.bands.triggered(band)
    }
}
