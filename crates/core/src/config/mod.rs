use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{analysis::Band, Result};

/// Gain is clamped into this range whenever it is set.
pub const MAX_GAIN: f32 = 4.0;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub spectrum: SpectrumConfig,
    pub bands: BandThresholds,
    pub beat: BeatConfig,
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Missing fields fall back to their
    /// defaults and out-of-range values are clamped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        Ok(config.sanitized())
    }

    /// Returns a copy with every value pulled back into its valid range.
    /// Invalid values are never rejected.
    pub fn sanitized(mut self) -> Self {
        self.audio = self.audio.sanitized();
        self.spectrum = self.spectrum.sanitized();
        self.bands = self.bands.sanitized();
        self.beat = self.beat.sanitized();
        self
    }
}

/// Configuration specific to the capture device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device_id: usize,
    pub sample_rate: u32,
    pub block_size: usize,
    pub channels: u16,
    pub gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            sample_rate: 44_100,
            block_size: 1024,
            channels: 1,
            gain: 1.0,
        }
    }
}

impl AudioConfig {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            device_id: self.device_id,
            sample_rate: if self.sample_rate == 0 {
                defaults.sample_rate
            } else {
                self.sample_rate
            },
            block_size: if self.block_size < 2 {
                defaults.block_size
            } else {
                self.block_size
            },
            channels: self.channels.max(1),
            gain: clamp_gain(self.gain),
        }
    }

    /// Number of spectrum bins produced for this block size.
    pub fn num_bins(&self) -> usize {
        self.block_size / 2
    }

    /// Nominal tick period when one block is analysed per tick.
    pub fn block_duration_ms(&self) -> f64 {
        self.block_size as f64 * 1000.0 / self.sample_rate.max(1) as f64
    }
}

/// Clamps a gain value into `[0, MAX_GAIN]`; NaN maps to unity gain.
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        1.0
    } else {
        gain.clamp(0.0, MAX_GAIN)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Weight of the newly computed magnitude in the per-bin moving average.
    pub smoothing: f32,
    /// Level (dB relative to a full-scale sine) that maps to 0.
    pub min_db: f32,
    /// Level that maps to 1. Anything louder saturates.
    pub max_db: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.2,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

impl SpectrumConfig {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let (min_db, max_db) =
            if self.min_db.is_finite() && self.max_db.is_finite() && self.max_db > self.min_db {
                (self.min_db, self.max_db)
            } else {
                (defaults.min_db, defaults.max_db)
            };

        Self {
            smoothing: unit_or(self.smoothing, defaults.smoothing),
            min_db,
            max_db,
        }
    }
}

/// Per-band trigger thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BandThresholds {
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub high: f32,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            bass: 0.6,
            low_mid: 0.5,
            mid: 0.4,
            high_mid: 0.3,
            high: 0.2,
        }
    }
}

impl BandThresholds {
    pub fn get(&self, band: Band) -> f32 {
        match band {
            Band::Bass => self.bass,
            Band::LowMid => self.low_mid,
            Band::Mid => self.mid,
            Band::HighMid => self.high_mid,
            Band::High => self.high,
        }
    }

    pub fn set(&mut self, band: Band, threshold: f32) {
        let slot = match band {
            Band::Bass => &mut self.bass,
            Band::LowMid => &mut self.low_mid,
            Band::Mid => &mut self.mid,
            Band::HighMid => &mut self.high_mid,
            Band::High => &mut self.high,
        };
        *slot = threshold;
    }

    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        for band in Band::ALL {
            let value = self.get(band);
            if !value.is_finite() || value < 0.0 {
                self.set(band, defaults.get(band));
            }
        }
        self
    }
}

/// Tunables for onset detection and tempo estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Energy must exceed the rolling average by this much to count as an onset.
    pub onset_delta: f32,
    /// Absolute energy below which no onset can fire.
    pub energy_floor: f32,
    pub min_interval_ms: f64,
    pub max_interval_ms: f64,
    pub energy_history: usize,
    pub interval_history: usize,
    pub beat_time_history: usize,
    pub min_beats_for_tempo: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Weight of a fresh BPM candidate in the exponential smoothing.
    pub bpm_smoothing: f32,
    pub initial_bpm: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            onset_delta: 0.15,
            energy_floor: 0.1,
            min_interval_ms: 300.0,
            max_interval_ms: 2000.0,
            energy_history: 43,
            interval_history: 8,
            beat_time_history: 10,
            min_beats_for_tempo: 4,
            min_bpm: 40.0,
            max_bpm: 200.0,
            bpm_smoothing: 0.2,
            initial_bpm: 120.0,
        }
    }
}

impl BeatConfig {
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let (min_interval_ms, max_interval_ms) =
            if self.min_interval_ms > 0.0 && self.max_interval_ms >= self.min_interval_ms {
                (self.min_interval_ms, self.max_interval_ms)
            } else {
                (d.min_interval_ms, d.max_interval_ms)
            };
        let (min_bpm, max_bpm) = if self.min_bpm > 0.0 && self.max_bpm >= self.min_bpm {
            (self.min_bpm, self.max_bpm)
        } else {
            (d.min_bpm, d.max_bpm)
        };
        let initial_bpm = if self.initial_bpm.is_finite() {
            self.initial_bpm.clamp(min_bpm, max_bpm)
        } else {
            d.initial_bpm.clamp(min_bpm, max_bpm)
        };

        Self {
            onset_delta: non_negative_or(self.onset_delta, d.onset_delta),
            energy_floor: non_negative_or(self.energy_floor, d.energy_floor),
            min_interval_ms,
            max_interval_ms,
            energy_history: nonzero_or(self.energy_history, d.energy_history),
            interval_history: nonzero_or(self.interval_history, d.interval_history),
            beat_time_history: nonzero_or(self.beat_time_history, d.beat_time_history).max(2),
            min_beats_for_tempo: self.min_beats_for_tempo.max(2),
            min_bpm,
            max_bpm,
            bpm_smoothing: unit_or(self.bpm_smoothing, d.bpm_smoothing),
            initial_bpm,
        }
    }
}

fn unit_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn non_negative_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

fn nonzero_or(value: usize, fallback: usize) -> usize {
    if value == 0 {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_live_settings() {
        let config = AppConfig::live_defaults();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.audio.num_bins(), 512);
        assert_eq!(config.bands.get(Band::HighMid), 0.3);
        assert_eq!(config.beat.energy_history, 43);
    }

    #[test]
    fn clamps_instead_of_rejecting() {
        let config = AppConfig {
            audio: AudioConfig {
                gain: 9.0,
                block_size: 1,
                sample_rate: 0,
                channels: 0,
                ..Default::default()
            },
            spectrum: SpectrumConfig {
                smoothing: 3.0,
                min_db: -20.0,
                max_db: -60.0,
            },
            beat: BeatConfig {
                energy_history: 0,
                min_bpm: 300.0,
                ..Default::default()
            },
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.audio.gain, MAX_GAIN);
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.spectrum.smoothing, 1.0);
        assert_eq!(config.spectrum.min_db, -100.0);
        assert_eq!(config.spectrum.max_db, -30.0);
        assert_eq!(config.beat.energy_history, 43);
        assert_eq!(config.beat.min_bpm, 40.0);
        assert_eq!(config.beat.max_bpm, 200.0);
    }

    #[test]
    fn negative_gain_clamps_to_zero() {
        assert_eq!(clamp_gain(-1.0), 0.0);
        assert_eq!(clamp_gain(f32::NAN), 1.0);
        assert_eq!(clamp_gain(2.5), 2.5);
    }

    #[test]
    fn parses_partial_json() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "audio": { "gain": 2.0 }, "bands": { "lowMid": 0.9 } }"#)
                .unwrap();
        assert_eq!(config.audio.gain, 2.0);
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.bands.low_mid, 0.9);
        assert_eq!(config.bands.bass, 0.6);
    }
}
