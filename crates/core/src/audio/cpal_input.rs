use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample};

use crate::{config::AudioConfig, BeatscopeError, Result};

use super::{
    backend::InputBackend,
    exchange::{BlockAssembler, SampleSink},
};

/// Input backend on top of the platform's default `cpal` host.
pub struct CpalBackend {
    host: cpal::Host,
    stream: Option<cpal::Stream>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            stream: None,
        }
    }

    fn device(&self, index: usize) -> Result<cpal::Device> {
        self.host
            .input_devices()
            .map_err(|err| BeatscopeError::Device(err.to_string()))?
            .nth(index)
            .ok_or(BeatscopeError::DeviceNotFound)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<String>> {
        let devices = self
            .host
            .input_devices()
            .map_err(|err| BeatscopeError::Device(err.to_string()))?;
        Ok(devices
            .map(|device| device.name().unwrap_or_else(|_| "Unknown".to_string()))
            .collect())
    }

    fn open(
        &mut self,
        device_index: usize,
        config: &AudioConfig,
        sink: Arc<dyn SampleSink>,
    ) -> Result<String> {
        self.close();

        let device = self.device(device_index)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let supported = device
            .default_input_config()
            .map_err(|err| BeatscopeError::Device(err.to_string()))?;
        let format = supported.sample_format();

        let requested = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match build_stream(&device, &requested, format, config.block_size, sink.clone())
        {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(
                    %err,
                    requested = config.sample_rate,
                    native = supported.sample_rate().0,
                    "falling back to the device's native sample rate"
                );
                let native: cpal::StreamConfig = supported.config();
                build_stream(&device, &native, format, config.block_size, sink)?
            }
        };

        stream
            .play()
            .map_err(|err| BeatscopeError::Device(err.to_string()))?;
        self.stream = Some(stream);
        Ok(name)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            // Dropping the stream joins the platform callback.
            drop(stream);
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CpalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalBackend")
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: SampleFormat,
    block_size: usize,
    sink: Arc<dyn SampleSink>,
) -> Result<cpal::Stream> {
    match format {
        SampleFormat::F32 => build_typed::<f32>(device, config, block_size, sink),
        SampleFormat::I16 => build_typed::<i16>(device, config, block_size, sink),
        SampleFormat::U16 => build_typed::<u16>(device, config, block_size, sink),
        SampleFormat::I32 => build_typed::<i32>(device, config, block_size, sink),
        other => Err(BeatscopeError::Device(format!(
            "unsupported sample format {other:?}"
        ))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    block_size: usize,
    sink: Arc<dyn SampleSink>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;
    let mut assembler = BlockAssembler::new(block_size);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                assembler.push_interleaved(
                    data.iter().map(|sample| f32::from_sample(*sample)),
                    channels,
                    sink.as_ref(),
                );
            },
            |err| tracing::warn!(%err, "input stream error"),
            None,
        )
        .map_err(|err| BeatscopeError::Device(err.to_string()))
}
