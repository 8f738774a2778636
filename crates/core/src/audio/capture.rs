use std::sync::Arc;

use crate::{config::AudioConfig, BeatscopeError, Result};

use super::{backend::InputBackend, exchange::SampleHandoff};

/// Owns the connection to an input device and the hand-off slot the device
/// writes into.
///
/// A source that failed to open stays usable: it reports `is_ready() ==
/// false` and every snapshot reads as silence.
pub struct CaptureSource {
    backend: Box<dyn InputBackend>,
    handoff: Arc<SampleHandoff>,
    config: AudioConfig,
    device_name: Option<String>,
}

impl CaptureSource {
    pub fn new(backend: Box<dyn InputBackend>, config: AudioConfig) -> Self {
        let config = config.sanitized();
        Self {
            handoff: Arc::new(SampleHandoff::new(config.block_size, config.gain)),
            backend,
            config,
            device_name: None,
        }
    }

    /// Source backed by the platform audio API when compiled with the
    /// `live-input` feature, otherwise by a backend with no devices.
    pub fn with_default_backend(config: AudioConfig) -> Self {
        Self::new(default_backend(), config)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn list_devices(&self) -> Result<Vec<String>> {
        self.backend.list_devices()
    }

    /// Opens the configured device, replacing any open stream.
    ///
    /// Every field of `config` takes effect, gain included. An out-of-range
    /// `device_id` falls back to device 0. On failure the source is left
    /// stopped and not ready, still holding the requested gain.
    pub fn configure(&mut self, config: AudioConfig) -> Result<()> {
        self.stop();

        self.config = config.sanitized();
        self.handoff = Arc::new(SampleHandoff::new(
            self.config.block_size,
            self.config.gain,
        ));

        let devices = match self.backend.list_devices() {
            Ok(devices) => devices,
            Err(err) => {
                tracing::warn!(%err, backend = self.backend.name(), "could not enumerate input devices");
                return Err(err);
            }
        };
        if devices.is_empty() {
            tracing::warn!(backend = self.backend.name(), "no input devices found");
            return Err(BeatscopeError::DeviceNotFound);
        }

        let index = if self.config.device_id < devices.len() {
            self.config.device_id
        } else {
            tracing::warn!(
                requested = self.config.device_id,
                available = devices.len(),
                "device id out of range, using device 0"
            );
            0
        };

        match self
            .backend
            .open(index, &self.config, self.handoff.clone())
        {
            Ok(name) => {
                tracing::info!(
                    device = %name,
                    sample_rate = self.config.sample_rate,
                    block_size = self.config.block_size,
                    "audio input opened"
                );
                self.config.device_id = index;
                self.device_name = Some(name);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "failed to open audio input");
                Err(err)
            }
        }
    }

    /// Stops delivery. Once this returns no callback is writing, and the
    /// slot reads as silence.
    pub fn stop(&mut self) {
        if let Some(name) = self.device_name.take() {
            self.backend.close();
            tracing::info!(device = %name, "audio input closed");
        }
        self.handoff.clear();
    }

    pub fn is_ready(&self) -> bool {
        self.device_name.is_some()
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Clamps `gain` to `[0, 4]`; takes effect on the next delivered block.
    pub fn set_gain(&mut self, gain: f32) -> f32 {
        let gain = self.handoff.set_gain(gain);
        self.config.gain = gain;
        gain
    }

    pub fn gain(&self) -> f32 {
        self.handoff.gain()
    }

    /// Copies the latest block into `out`. Reads zeros when not ready.
    pub fn snapshot_into(&self, out: &mut [f32]) -> u64 {
        if self.is_ready() {
            self.handoff.snapshot_into(out)
        } else {
            out.fill(0.0);
            self.handoff.delivered()
        }
    }

    pub fn handoff(&self) -> &Arc<SampleHandoff> {
        &self.handoff
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("backend", &self.backend.name())
            .field("device", &self.device_name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(feature = "live-input")]
fn default_backend() -> Box<dyn InputBackend> {
    Box::new(super::cpal_input::CpalBackend::new())
}

#[cfg(not(feature = "live-input"))]
fn default_backend() -> Box<dyn InputBackend> {
    Box::new(super::backend::NullBackend)
}
