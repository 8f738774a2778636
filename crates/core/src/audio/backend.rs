use std::sync::{Arc, Mutex, PoisonError};

use crate::{config::AudioConfig, BeatscopeError, Result};

use super::exchange::{BlockAssembler, SampleSink};

/// Platform audio API seen from the capture source.
///
/// A backend enumerates input devices and, once opened, calls the supplied
/// sink from its own delivery context with mono blocks of
/// `config.block_size` samples.
pub trait InputBackend {
    fn name(&self) -> &'static str;

    fn list_devices(&self) -> Result<Vec<String>>;

    /// Starts streaming from `device_index` and returns the device name.
    fn open(
        &mut self,
        device_index: usize,
        config: &AudioConfig,
        sink: Arc<dyn SampleSink>,
    ) -> Result<String>;

    /// Stops streaming. No delivery may be in flight once this returns.
    fn close(&mut self);
}

/// Backend with no devices at all. Every open fails, leaving the engine on
/// silence.
#[derive(Debug, Default)]
pub struct NullBackend;

impl InputBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn list_devices(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn open(&mut self, _: usize, _: &AudioConfig, _: Arc<dyn SampleSink>) -> Result<String> {
        Err(BeatscopeError::DeviceNotFound)
    }

    fn close(&mut self) {}
}

struct FeedTarget {
    sink: Arc<dyn SampleSink>,
    assembler: BlockAssembler,
    channels: usize,
}

/// In-process input driven by [`ManualFeed::push`], for offline analysis and
/// tests.
pub struct ManualBackend {
    devices: Vec<String>,
    target: Arc<Mutex<Option<FeedTarget>>>,
}

impl ManualBackend {
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
            target: Arc::new(Mutex::new(None)),
        }
    }

    /// A backend exposing one device named `manual`.
    pub fn single() -> Self {
        Self::new(["manual"])
    }

    /// Returns a feed that pushes into whichever device is currently open.
    pub fn feed(&self) -> ManualFeed {
        ManualFeed {
            target: self.target.clone(),
        }
    }
}

impl InputBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn list_devices(&self) -> Result<Vec<String>> {
        Ok(self.devices.clone())
    }

    fn open(
        &mut self,
        device_index: usize,
        config: &AudioConfig,
        sink: Arc<dyn SampleSink>,
    ) -> Result<String> {
        let name = self
            .devices
            .get(device_index)
            .cloned()
            .ok_or(BeatscopeError::DeviceNotFound)?;

        let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        *target = Some(FeedTarget {
            sink,
            assembler: BlockAssembler::new(config.block_size),
            channels: config.channels.max(1) as usize,
        });
        Ok(name)
    }

    fn close(&mut self) {
        let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        *target = None;
    }
}

impl std::fmt::Debug for ManualBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualBackend")
            .field("devices", &self.devices)
            .finish()
    }
}

/// Producer side of a [`ManualBackend`].
#[derive(Clone)]
pub struct ManualFeed {
    target: Arc<Mutex<Option<FeedTarget>>>,
}

impl ManualFeed {
    /// Pushes interleaved samples of any length. Complete blocks are
    /// delivered to the open device; returns how many were delivered, or 0
    /// when nothing is open.
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        match target.as_mut() {
            Some(target) => {
                let channels = target.channels;
                target
                    .assembler
                    .push_interleaved(samples.iter().copied(), channels, target.sink.as_ref())
            }
            None => 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.target
            .lock()
            .map(|target| target.is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for ManualFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualFeed")
            .field("open", &self.is_open())
            .finish()
    }
}
