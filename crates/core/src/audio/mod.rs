use std::sync::{Arc, Mutex, MutexGuard};

mod backend;
mod capture;
#[cfg(feature = "live-input")]
mod cpal_input;
mod exchange;

pub use backend::{InputBackend, ManualBackend, ManualFeed, NullBackend};
pub use capture::CaptureSource;
#[cfg(feature = "live-input")]
pub use cpal_input::CpalBackend;
pub use exchange::{BlockAssembler, SampleHandoff, SampleSink};

use crate::{
    AnalysisEngine, AnalysisFrame, AppConfig, BeatscopeError, MonotonicClock, Result,
};

/// Per-tick driver tying capture to analysis.
///
/// The host calls [`AudioEngine::update`] once per frame. Each call takes a
/// snapshot of the latest captured block, runs the analysis pipeline and
/// publishes the resulting frame to every [`AnalysisHandle`].
#[derive(Debug)]
pub struct AudioEngine {
    config: AppConfig,
    capture: CaptureSource,
    analysis: AnalysisEngine,
    snapshot: Vec<f32>,
    clock: MonotonicClock,
    latest: Arc<Mutex<Arc<AnalysisFrame>>>,
}

impl AudioEngine {
    /// Creates an engine on the given input backend. No device is opened
    /// until [`AudioEngine::start`].
    pub fn new(config: AppConfig, backend: Box<dyn InputBackend>) -> Result<Self> {
        let config = config.sanitized();
        let capture = CaptureSource::new(backend, config.audio.clone());
        Self::with_capture(config, capture)
    }

    /// Creates an engine on the platform audio backend, see
    /// [`CaptureSource::with_default_backend`].
    pub fn with_default_backend(config: AppConfig) -> Result<Self> {
        let config = config.sanitized();
        let capture = CaptureSource::with_default_backend(config.audio.clone());
        Self::with_capture(config, capture)
    }

    fn with_capture(config: AppConfig, capture: CaptureSource) -> Result<Self> {
        let analysis = AnalysisEngine::new(&config)?;
        let silent = AnalysisFrame::silent(analysis.num_bins());

        Ok(Self {
            capture,
            snapshot: vec![0.0; config.audio.block_size],
            analysis,
            config,
            clock: MonotonicClock::start(),
            latest: Arc::new(Mutex::new(Arc::new(silent))),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Opens the configured input device and returns a handle to the
    /// published frames.
    ///
    /// A missing device is not an error here: the engine keeps running on
    /// silence and frames report `input_ready == false`.
    pub fn start(&mut self) -> AnalysisHandle {
        if let Err(err) = self.capture.configure(self.config.audio.clone()) {
            tracing::warn!(%err, "continuing without audio input");
        }
        self.handle()
    }

    /// Switches to another input device.
    ///
    /// The current stream is fully stopped first and the beat histories are
    /// cleared so statistics from the old device do not blend with the new
    /// one. The returned error is informational; the engine stays usable.
    pub fn select_device(&mut self, device_id: usize) -> Result<()> {
        self.capture.stop();
        self.analysis.clear_histories();

        self.config.audio.device_id = device_id;
        self.config.audio.gain = self.capture.gain();
        let result = self.capture.configure(self.config.audio.clone());
        self.config.audio.device_id = self.capture.config().device_id;
        result
    }

    /// Returns the clamped gain actually applied.
    pub fn set_gain(&mut self, gain: f32) -> f32 {
        let gain = self.capture.set_gain(gain);
        self.config.audio.gain = gain;
        gain
    }

    pub fn input_ready(&self) -> bool {
        self.capture.is_ready()
    }

    pub fn capture(&self) -> &CaptureSource {
        &self.capture
    }

    pub fn analysis(&self) -> &AnalysisEngine {
        &self.analysis
    }

    pub fn list_devices(&self) -> Result<Vec<String>> {
        self.capture.list_devices()
    }

    /// Runs one tick stamped with the engine's monotonic clock.
    pub fn update(&mut self) -> Result<Arc<AnalysisFrame>> {
        let now_ms = self.clock.now_ms();
        self.update_at(now_ms)
    }

    /// Runs one tick with an explicit timestamp in milliseconds.
    pub fn update_at(&mut self, now_ms: f64) -> Result<Arc<AnalysisFrame>> {
        let ready = self.capture.is_ready();
        self.capture.snapshot_into(&mut self.snapshot);

        let frame = Arc::new(self.analysis.process_block(&self.snapshot, now_ms, ready)?);
        *self.lock_latest()? = frame.clone();
        Ok(frame)
    }

    /// Returns the most recently published frame.
    pub fn latest_frame(&self) -> Result<Arc<AnalysisFrame>> {
        Ok(self.lock_latest()?.clone())
    }

    pub fn handle(&self) -> AnalysisHandle {
        AnalysisHandle::new(self.latest.clone())
    }

    /// Stops capture and clears all analysis state.
    pub fn reset(&mut self) {
        self.capture.stop();
        self.analysis.reset();
    }

    pub fn stop(&mut self) {
        self.capture.stop();
    }

    fn lock_latest(&self) -> Result<MutexGuard<'_, Arc<AnalysisFrame>>> {
        self.latest
            .lock()
            .map_err(|_| BeatscopeError::msg("published frame has been poisoned"))
    }
}

/// Shared, thread-safe view of the frames published by [`AudioEngine`].
///
/// Readers always receive a whole frame: publication swaps a pointer to a
/// finished frame, so a reader sees either the previous or the new one.
#[derive(Clone)]
pub struct AnalysisHandle {
    shared: Arc<Mutex<Arc<AnalysisFrame>>>,
}

impl AnalysisHandle {
    pub(crate) fn new(shared: Arc<Mutex<Arc<AnalysisFrame>>>) -> Self {
        Self { shared }
    }

    /// Returns the latest complete frame.
    pub fn latest(&self) -> Result<Arc<AnalysisFrame>> {
        let frame = self
            .shared
            .lock()
            .map_err(|_| BeatscopeError::msg("published frame has been poisoned"))?;
        Ok(frame.clone())
    }
}

impl std::fmt::Debug for AnalysisHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisHandle").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioConfig;

    fn small_config() -> AppConfig {
        AppConfig {
            audio: AudioConfig {
                block_size: 64,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn publishes_frames_to_handles() {
        let backend = ManualBackend::single();
        let feed = backend.feed();
        let mut engine = AudioEngine::new(small_config(), Box::new(backend)).unwrap();
        let handle = engine.start();
        assert!(engine.input_ready());

        let before = handle.latest().unwrap();
        assert_eq!(before.spectrum.len(), 32);
        assert!(!before.input_ready);

        feed.push(&[0.5; 64]);
        let frame = engine.update_at(10.0).unwrap();
        let seen = handle.latest().unwrap();
        assert!(Arc::ptr_eq(&frame, &seen));
        assert!(seen.input_ready);
        assert!(seen.level > 0.0);
        assert_eq!(seen.waveform, vec![0.5; 64]);
    }

    #[test]
    fn runs_on_silence_without_a_device() {
        let mut engine = AudioEngine::new(small_config(), Box::new(NullBackend)).unwrap();
        let handle = engine.start();
        assert!(!engine.input_ready());

        for tick in 0..10 {
            let frame = engine.update_at(tick as f64 * 23.0).unwrap();
            assert!(!frame.input_ready);
            assert_eq!(frame.bpm(), 120.0);
            assert!(frame.spectrum.iter().all(|v| *v == 0.0));
        }
        assert!(!handle.latest().unwrap().input_ready);
    }

    #[test]
    fn handles_are_usable_from_other_threads() {
        let mut engine = AudioEngine::new(small_config(), Box::new(NullBackend)).unwrap();
        let handle = engine.start();
        engine.update_at(5.0).unwrap();

        let time = std::thread::spawn(move || handle.latest().unwrap().time_ms)
            .join()
            .unwrap();
        assert_eq!(time, 5.0);
    }

    #[test]
    fn device_selection_clears_histories() {
        let backend = ManualBackend::new(["one", "two"]);
        let mut engine = AudioEngine::new(small_config(), Box::new(backend)).unwrap();
        engine.start();
        for tick in 0..50 {
            engine.update_at(tick as f64 * 10.0).unwrap();
        }
        assert_eq!(engine.analysis().beat_detector().energy_history_len(), 43);

        engine.set_gain(3.0);
        engine.select_device(1).unwrap();
        assert_eq!(engine.capture().device_name(), Some("two"));
        assert_eq!(engine.analysis().beat_detector().energy_history_len(), 0);
        assert_eq!(engine.capture().gain(), 3.0);
    }
}
