//! Core library for Beatscope.
//!
//! Turns a live audio stream into per-tick [`AnalysisFrame`]s for the
//! rendering side: a smoothed magnitude spectrum, five band energies with
//! threshold triggers, and a tempo estimate (BPM, confidence, beat phase and
//! a one-tick beat pulse).
//!
//! Capture runs on the audio backend's own thread and only copies samples
//! into a [`SampleHandoff`]. Everything else happens synchronously inside
//! [`AudioEngine::update`], called once per frame by the host.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod timeline;

pub use analysis::{
    band_ranges, AnalysisEngine, AnalysisFrame, Band, BandEnergy, BandEnergyExtractor,
    BeatDetector, SpectralAnalyzer, TempoEstimate,
};
#[cfg(feature = "live-input")]
pub use audio::CpalBackend;
pub use audio::{
    AnalysisHandle, AudioEngine, BlockAssembler, CaptureSource, InputBackend, ManualBackend,
    ManualFeed, NullBackend, SampleHandoff, SampleSink,
};
pub use config::{AppConfig, AudioConfig, BandThresholds, BeatConfig, SpectrumConfig};
pub use error::{BeatscopeError, Result};
pub use timeline::{FrameTimeline, MonotonicClock, PlaybackClock};
