use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::BandThresholds;

/// The five frequency bands reported to consumers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Band {
    Bass,
    LowMid,
    Mid,
    HighMid,
    High,
}

impl Band {
    pub const COUNT: usize = 5;
    pub const ALL: [Band; Band::COUNT] = [
        Band::Bass,
        Band::LowMid,
        Band::Mid,
        Band::HighMid,
        Band::High,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used by control surfaces and presets.
    pub fn name(self) -> &'static str {
        match self {
            Band::Bass => "bass",
            Band::LowMid => "lowMid",
            Band::Mid => "mid",
            Band::HighMid => "highMid",
            Band::High => "high",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.name() == name)
    }
}

/// Per-band mean energy and trigger state for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandEnergy {
    pub energies: [f32; Band::COUNT],
    pub triggers: [bool; Band::COUNT],
}

impl BandEnergy {
    pub fn energy(&self, band: Band) -> f32 {
        self.energies[band.index()]
    }

    pub fn triggered(&self, band: Band) -> bool {
        self.triggers[band.index()]
    }

    /// Name-based lookup; unknown names read as silent.
    pub fn energy_by_name(&self, name: &str) -> f32 {
        Band::from_name(name).map(|band| self.energy(band)).unwrap_or(0.0)
    }

    pub fn triggered_by_name(&self, name: &str) -> bool {
        Band::from_name(name)
            .map(|band| self.triggered(band))
            .unwrap_or(false)
    }
}

/// Splits a spectrum of `len` bins into the five band ranges.
///
/// Upper boundaries sit at 1/8, 1/4, 1/2 and 3/4 of `len` and each band owns
/// its right boundary bin, so the ranges are contiguous, never overlap and
/// together cover `0..len`. Bands can be empty for very short spectra.
pub fn band_ranges(len: usize) -> [Range<usize>; Band::COUNT] {
    let upper = [len / 8, len / 4, len / 2, len * 3 / 4];
    let mut ranges: [Range<usize>; Band::COUNT] = Default::default();
    let mut start = 0;

    for (slot, boundary) in ranges.iter_mut().zip(upper) {
        let end = (boundary + 1).clamp(start, len);
        *slot = start..end;
        start = end;
    }
    ranges[Band::COUNT - 1] = start..len;

    ranges
}

/// Reduces a spectrum to per-band energies and threshold triggers.
#[derive(Debug, Clone)]
pub struct BandEnergyExtractor {
    thresholds: BandThresholds,
    ranges: [Range<usize>; Band::COUNT],
    ranges_len: usize,
}

impl BandEnergyExtractor {
    pub fn new(thresholds: BandThresholds) -> Self {
        Self {
            thresholds,
            ranges: band_ranges(0),
            ranges_len: 0,
        }
    }

    pub fn thresholds(&self) -> &BandThresholds {
        &self.thresholds
    }

    pub fn set_threshold(&mut self, band: Band, threshold: f32) {
        self.thresholds.set(band, threshold);
    }

    pub fn extract(&mut self, spectrum: &[f32]) -> BandEnergy {
        if self.ranges_len != spectrum.len() {
            self.ranges = band_ranges(spectrum.len());
            self.ranges_len = spectrum.len();
        }

        let mut result = BandEnergy::default();
        for band in Band::ALL {
            let bins = &spectrum[self.ranges[band.index()].clone()];
            let energy = if bins.is_empty() {
                0.0
            } else {
                bins.iter().sum::<f32>() / bins.len() as f32
            };
            result.energies[band.index()] = energy;
            result.triggers[band.index()] = energy > self.thresholds.get(band);
        }
        result
    }
}

impl Default for BandEnergyExtractor {
    fn default() -> Self {
        Self::new(BandThresholds::default())
    }
}
