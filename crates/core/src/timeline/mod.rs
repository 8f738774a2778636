use std::{cmp::Ordering, path::Path, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{AnalysisFrame, Result};

/// Wall-clock milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Manually advanced clock for offline analysis and deterministic replays.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackClock {
    pub time_ms: f64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_ms = 0.0;
    }

    pub fn advance(&mut self, delta_ms: f64) {
        self.time_ms = (self.time_ms + delta_ms).max(0.0);
    }

    pub fn now_ms(&self) -> f64 {
        self.time_ms
    }
}

/// Ordered sequence of frames produced offline, sampled by timestamp during
/// playback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameTimeline {
    pub sample_rate: u32,
    pub block_size: usize,
    frames: Vec<AnalysisFrame>,
}

impl FrameTimeline {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            frames: Vec::new(),
        }
    }

    /// Appends a frame; frames must arrive in timestamp order.
    pub fn push(&mut self, frame: AnalysisFrame) {
        debug_assert!(self
            .frames
            .last()
            .map(|last| last.time_ms <= frame.time_ms)
            .unwrap_or(true));
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[AnalysisFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        self.frames.last().map(|frame| frame.time_ms).unwrap_or(0.0)
    }

    /// Final tempo estimate of the analysed material, if any beat was seen.
    pub fn final_bpm(&self) -> Option<f32> {
        self.frames
            .last()
            .filter(|frame| frame.tempo.confidence > 0.0)
            .map(|frame| frame.tempo.bpm)
    }

    /// Returns the frame at (or immediately before) `time_ms`. Before the
    /// first frame a silent frame stamped with `time_ms` is returned.
    pub fn sample_at(&self, time_ms: f64) -> AnalysisFrame {
        match self.frames.binary_search_by(|frame| {
            frame
                .time_ms
                .partial_cmp(&time_ms)
                .unwrap_or(Ordering::Equal)
        }) {
            Ok(index) => self.frames[index].clone(),
            Err(0) => AnalysisFrame {
                time_ms,
                ..AnalysisFrame::silent(self.block_size / 2)
            },
            Err(index) => self.frames[index - 1].clone(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_at(time_ms: f64, bpm: f32) -> AnalysisFrame {
        let mut frame = AnalysisFrame::silent(4);
        frame.time_ms = time_ms;
        frame.tempo.bpm = bpm;
        frame
    }

    #[test]
    fn playback_clock_never_goes_negative() {
        let mut clock = PlaybackClock::default();
        clock.advance(23.2);
        assert!((clock.now_ms() - 23.2).abs() < 1e-9);
        clock.advance(-100.0);
        assert_eq!(clock.now_ms(), 0.0);
    }

    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock::start();
        let first = clock.now_ms();
        assert!(clock.now_ms() >= first);
    }

    #[test]
    fn sampling_returns_previous_frame() {
        let mut timeline = FrameTimeline::new(44_100, 8);
        timeline.push(frame_at(0.0, 100.0));
        timeline.push(frame_at(10.0, 110.0));
        timeline.push(frame_at(20.0, 120.0));

        assert_eq!(timeline.sample_at(10.0).bpm(), 110.0);
        assert_eq!(timeline.sample_at(15.0).bpm(), 110.0);
        assert_eq!(timeline.sample_at(99.0).bpm(), 120.0);

        let before = timeline.sample_at(-5.0);
        assert_eq!(before.time_ms, -5.0);
        assert_eq!(before.spectrum.len(), 4);
    }

    #[test]
    fn round_trips_through_json() {
        let mut timeline = FrameTimeline::new(44_100, 8);
        timeline.push(frame_at(0.0, 100.0));
        timeline.push(frame_at(23.0, 101.0));

        let path = std::env::temp_dir().join(format!(
            "beatscope-timeline-{}.json",
            std::process::id()
        ));
        timeline.save(&path).unwrap();
        let loaded = FrameTimeline::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.frames()[1], timeline.frames()[1]);
        assert_eq!(loaded.block_size, 8);
    }
}
