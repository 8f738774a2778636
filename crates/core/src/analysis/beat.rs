use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::BeatConfig;

/// Tempo state published with every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    pub bpm: f32,
    pub confidence: f32,
    /// Position inside the current beat, `0.0` at the beat itself.
    pub phase: f32,
    /// True only on the tick that detected the beat.
    pub on_beat: bool,
}

impl Default for TempoEstimate {
    fn default() -> Self {
        Self {
            bpm: BeatConfig::default().initial_bpm,
            confidence: 0.0,
            phase: 0.0,
            on_beat: false,
        }
    }
}

/// Fixed-capacity window that drops its oldest entry on overflow.
#[derive(Debug, Clone)]
struct History<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> History<T> {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.values.iter()
    }
}

/// Bass-onset beat tracker.
///
/// Onsets are energy spikes above a rolling one-second baseline. Accepted
/// beat timestamps feed a smoothed BPM estimate, and the phase is derived
/// every tick from the time since the last beat.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    config: BeatConfig,
    energy_history: History<f32>,
    interval_history: History<f64>,
    beat_times: History<f64>,
    rolling_average: f32,
    last_beat_ms: f64,
    bpm: f32,
    confidence: f32,
    phase: f32,
    on_beat: bool,
}

impl BeatDetector {
    pub fn new(config: BeatConfig) -> Self {
        let config = config.sanitized();
        Self {
            energy_history: History::new(config.energy_history),
            interval_history: History::new(config.interval_history),
            beat_times: History::new(config.beat_time_history),
            rolling_average: 0.0,
            last_beat_ms: 0.0,
            bpm: config.initial_bpm,
            confidence: 0.0,
            phase: 0.0,
            on_beat: false,
            config,
        }
    }

    pub fn config(&self) -> &BeatConfig {
        &self.config
    }

    /// Advances the tracker by one tick.
    ///
    /// `bass_energy` is the current bass band energy and `now_ms` the tick
    /// timestamp in milliseconds on a monotonic clock.
    pub fn update(&mut self, bass_energy: f32, now_ms: f64) -> TempoEstimate {
        let energy = if bass_energy.is_finite() { bass_energy } else { 0.0 };

        self.energy_history.push(energy);
        self.rolling_average =
            self.energy_history.iter().sum::<f32>() / self.energy_history.len() as f32;

        self.on_beat = false;
        let since_last = now_ms - self.last_beat_ms;

        if energy > self.rolling_average + self.config.onset_delta
            && energy > self.config.energy_floor
            && since_last > self.config.min_interval_ms
        {
            self.on_beat = true;
            self.last_beat_ms = now_ms;
            self.accept_interval(since_last, now_ms);
        }

        self.update_phase(now_ms);
        self.estimate()
    }

    fn accept_interval(&mut self, interval_ms: f64, now_ms: f64) {
        if interval_ms < self.config.min_interval_ms || interval_ms > self.config.max_interval_ms {
            tracing::trace!(interval_ms, "beat interval outside tempo range, ignored");
            return;
        }

        self.interval_history.push(interval_ms);
        self.beat_times.push(now_ms);
        tracing::debug!(interval_ms, beats = self.beat_times.len(), "beat accepted");

        if self.beat_times.len() < self.config.min_beats_for_tempo {
            return;
        }

        let first = self.beat_times.iter().next().copied().unwrap_or(now_ms);
        let gaps = (self.beat_times.len() - 1) as f64;
        // Consecutive differences telescope to the overall span.
        let mean_interval = (now_ms - first) / gaps;
        if mean_interval <= 0.0 {
            return;
        }

        let candidate = (60_000.0 / mean_interval) as f32;
        if candidate < self.config.min_bpm || candidate > self.config.max_bpm {
            tracing::trace!(candidate, "tempo candidate outside range, ignored");
            return;
        }

        let weight = self.config.bpm_smoothing;
        self.bpm = self.bpm * (1.0 - weight) + candidate * weight;
        self.confidence =
            (self.beat_times.len() as f32 / self.config.beat_time_history as f32).min(1.0);
        tracing::debug!(bpm = self.bpm, candidate, confidence = self.confidence, "tempo updated");
    }

    fn update_phase(&mut self, now_ms: f64) {
        let beat_ms = 60_000.0 / self.bpm as f64;
        let phase = ((now_ms - self.last_beat_ms).rem_euclid(beat_ms) / beat_ms) as f32;
        // Rounding can land exactly on 1.0.
        self.phase = if (0.0..1.0).contains(&phase) { phase } else { 0.0 };
    }

    pub fn estimate(&self) -> TempoEstimate {
        TempoEstimate {
            bpm: self.bpm,
            confidence: self.confidence,
            phase: self.phase,
            on_beat: self.on_beat,
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn rolling_average(&self) -> f32 {
        self.rolling_average
    }

    pub fn last_beat_ms(&self) -> f64 {
        self.last_beat_ms
    }

    pub fn energy_history_len(&self) -> usize {
        self.energy_history.len()
    }

    pub fn interval_history_len(&self) -> usize {
        self.interval_history.len()
    }

    pub fn beat_time_history_len(&self) -> usize {
        self.beat_times.len()
    }

    /// Accepted beat-to-beat intervals, oldest first.
    pub fn intervals(&self) -> impl Iterator<Item = f64> + '_ {
        self.interval_history.iter().copied()
    }

    /// Drops the bounded histories while keeping the tempo estimate, so a
    /// new input source starts from fresh statistics.
    pub fn clear_histories(&mut self) {
        self.energy_history.clear();
        self.interval_history.clear();
        self.beat_times.clear();
        self.rolling_average = 0.0;
    }

    /// Restores the initial state.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(BeatConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_MS: f64 = 10.0;

    /// Feeds a pulse train: energy 1.0 on the first tick at or after each
    /// multiple of `period_ms`, silence elsewhere. Returns the tick times at
    /// which the detector fired.
    fn run_pulses(detector: &mut BeatDetector, period_ms: f64, pulses: usize) -> Vec<f64> {
        let mut fired = Vec::new();
        let mut next_pulse = period_ms;
        let end = period_ms * (pulses as f64 + 0.5);
        let mut tick = 0;
        loop {
            tick += 1;
            let now = tick as f64 * TICK_MS;
            if now > end {
                break;
            }
            let energy = if now >= next_pulse {
                next_pulse += period_ms;
                1.0
            } else {
                0.0
            };
            if detector.update(energy, now).on_beat {
                fired.push(now);
            }
        }
        fired
    }

    /// A detector whose energy window is already full of silence.
    fn warmed_up() -> BeatDetector {
        let mut detector = BeatDetector::default();
        for tick in 0..43 {
            detector.update(0.0, tick as f64 * TICK_MS);
        }
        detector
    }

    #[test]
    fn silence_never_fires_or_moves_tempo() {
        let mut detector = BeatDetector::default();
        for tick in 0..300 {
            let estimate = detector.update(0.0, tick as f64 * 23.2);
            assert!(!estimate.on_beat);
            assert_eq!(estimate.bpm, 120.0);
            assert_eq!(estimate.confidence, 0.0);
        }
    }

    #[test]
    fn fires_once_per_pulse() {
        let mut detector = BeatDetector::default();
        let fired = run_pulses(&mut detector, 500.0, 6);
        assert_eq!(fired, vec![500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0]);
    }

    #[test]
    fn converges_toward_pulse_tempo() {
        for period in [310.0, 450.0, 750.0, 1200.0, 1500.0] {
            let mut detector = BeatDetector::default();
            run_pulses(&mut detector, period, 40);
            let target = (60_000.0 / period) as f32;
            let bpm = detector.bpm();
            assert!(
                (bpm - target).abs() <= target * 0.05,
                "period {period}: bpm {bpm} vs {target}"
            );
            assert_eq!(detector.estimate().confidence, 1.0);
        }
    }

    #[test]
    fn tempo_is_smoothed_not_snapped() {
        let mut detector = BeatDetector::default();
        run_pulses(&mut detector, 1000.0, 4);
        // First estimate after the 4th beat: 120 * 0.8 + 60 * 0.2.
        assert!((detector.bpm() - 108.0).abs() < 1e-3);
        assert!((detector.estimate().confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn histories_stay_bounded() {
        let mut detector = BeatDetector::default();
        run_pulses(&mut detector, 400.0, 200);
        assert_eq!(detector.energy_history_len(), 43);
        assert_eq!(detector.interval_history_len(), 8);
        assert_eq!(detector.beat_time_history_len(), 10);
    }

    #[test]
    fn onsets_inside_minimum_gap_are_ignored() {
        let mut detector = warmed_up();
        assert!(detector.update(1.0, 500.0).on_beat);
        for tick in 1..25 {
            detector.update(0.0, 500.0 + tick as f64 * 10.0);
        }
        let estimate = detector.update(1.0, 750.0);
        assert!(!estimate.on_beat);
        assert_eq!(detector.last_beat_ms(), 500.0);
    }

    #[test]
    fn overlong_interval_fires_without_touching_tempo() {
        let mut detector = BeatDetector::default();
        run_pulses(&mut detector, 500.0, 6);
        let bpm = detector.bpm();
        let intervals = detector.interval_history_len();
        let beats = detector.beat_time_history_len();
        let last = detector.last_beat_ms();

        let mut now = last + 260.0;
        while now < last + 2500.0 {
            detector.update(0.0, now);
            now += TICK_MS;
        }
        assert_eq!(now - last, 2500.0);
        let estimate = detector.update(1.0, now);

        assert!(estimate.on_beat);
        assert_eq!(detector.last_beat_ms(), now);
        assert_eq!(detector.interval_history_len(), intervals);
        assert_eq!(detector.beat_time_history_len(), beats);
        assert_eq!(detector.bpm(), bpm);
    }

    #[test]
    fn on_beat_lasts_a_single_tick() {
        let mut detector = warmed_up();
        assert!(detector.update(1.0, 500.0).on_beat);
        assert!(!detector.update(1.0, 510.0).on_beat);
        assert!(!detector.update(0.0, 520.0).on_beat);
    }

    #[test]
    fn phase_tracks_time_since_last_beat() {
        let mut detector = warmed_up();
        let estimate = detector.update(1.0, 500.0);
        assert!(estimate.on_beat);
        assert_eq!(estimate.phase, 0.0);

        // 120 bpm -> 500 ms per beat.
        let estimate = detector.update(0.0, 750.0);
        assert!((estimate.phase - 0.5).abs() < 1e-6);
        let estimate = detector.update(0.0, 1125.0);
        assert!((estimate.phase - 0.25).abs() < 1e-6);
    }

    #[test]
    fn phase_stays_in_unit_interval() {
        let mut detector = BeatDetector::default();
        let mut now = 0.0;
        for tick in 0..5000 {
            now += 7.3;
            let energy = if tick % 37 == 0 { 0.9 } else { 0.05 };
            let phase = detector.update(energy, now).phase;
            assert!((0.0..1.0).contains(&phase), "phase {phase}");
        }
        // A clock that jumps backwards still yields a valid phase.
        let phase = detector.update(0.0, 1.0).phase;
        assert!((0.0..1.0).contains(&phase));
    }

    #[test]
    fn clearing_histories_keeps_tempo() {
        let mut detector = BeatDetector::default();
        run_pulses(&mut detector, 600.0, 12);
        let bpm = detector.bpm();
        detector.clear_histories();
        assert_eq!(detector.energy_history_len(), 0);
        assert_eq!(detector.interval_history_len(), 0);
        assert_eq!(detector.beat_time_history_len(), 0);
        assert_eq!(detector.bpm(), bpm);

        detector.reset();
        assert_eq!(detector.bpm(), 120.0);
        assert_eq!(detector.last_beat_ms(), 0.0);
    }
}
