//! CPAL audio driver.
//!
//! CPAL delivers interleaved samples through separate input and output
//! streams with callback sizes chosen by the backend. This adapter buffers
//! input through a ring, re-blocks everything to `buffer_frames`, and calls
//! the handler once per block from the output callback.

use super::{switch_or_silence, AudioDriver, DeviceInfo, SharedBufferSwitch};
use crate::buffers::NativeBuffers;
use crate::format::{DeviceProperties, SampleFormat};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};

const DEFAULT_BUFFER_FRAMES: u32 = 512;

/// Input ring size in blocks.
const INPUT_RING_BLOCKS: usize = 4;

/// Device selection for [`CpalDriver::open`].
#[derive(Debug, Clone, Default)]
pub struct CpalConfig {
    /// Device name; `None` picks the host's default devices.
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    /// Fixed block length; `None` picks 512 clamped to the device range.
    pub buffer_frames: Option<u32>,
    /// Open a 32-bit integer stream when the device offers one.
    pub prefer_int32: bool,
}

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` on some platforms. The driver never moves a
/// stream to another thread while it is playing; it is created and dropped
/// by whoever owns the driver.
struct StreamHandle(cpal::Stream);

// SAFETY: see above, the handle is only touched by the driver's owner.
unsafe impl Send for StreamHandle {}

/// Hardware driver backed by the platform's default CPAL host.
pub struct CpalDriver {
    properties: DeviceProperties,
    device_name: String,
    sample_format: cpal::SampleFormat,
    output_device: cpal::Device,
    output_config: cpal::StreamConfig,
    input: Option<(cpal::Device, cpal::StreamConfig)>,
    streams: Vec<StreamHandle>,
}

impl CpalDriver {
    /// Open a device. Nothing plays until [`AudioDriver::start`].
    pub fn open(config: &CpalConfig) -> Result<Self> {
        let host = cpal::default_host();

        let output_device = match &config.device {
            Some(name) => host
                .output_devices()?
                .find(|device| device.name().is_ok_and(|n| &n == name))
                .ok_or_else(|| Error::InvalidDevice(format!("No output device named '{name}'")))?,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::InvalidDevice("No output device available".to_string()))?,
        };
        let device_name = output_device.name()?;

        let supported = choose_output_config(&output_device, config)?;
        let sample_format = supported.sample_format();
        let format = native_format(sample_format)?;

        let (buffer_frames, buffer_size) =
            stream_buffer_size(config.buffer_frames, supported.buffer_size());
        if buffer_frames == 0 {
            return Err(Error::InvalidConfig("buffer_frames must be non-zero".to_string()));
        }
        if matches!(buffer_size, cpal::BufferSize::Default) {
            tracing::warn!(
                device = %device_name,
                frames = buffer_frames,
                "backend buffer size unknown, MIDI timing is coarse when callbacks exceed one block"
            );
        }

        let mut output_config = supported.config();
        output_config.buffer_size = buffer_size;

        let input = matching_input(&host, config.device.as_deref(), sample_format, output_config.sample_rate)
            .map(|(device, mut input_config)| {
                input_config.buffer_size = output_config.buffer_size.clone();
                (device, input_config)
            });
        if input.is_none() {
            tracing::warn!(device = %device_name, "no matching input stream, running output only");
        }

        let properties = DeviceProperties {
            sample_rate: output_config.sample_rate.0 as f64,
            format,
            num_inputs: input.as_ref().map_or(0, |(_, c)| c.channels as usize),
            num_outputs: output_config.channels as usize,
            buffer_frames: buffer_frames as usize,
        };
        tracing::info!(device = %device_name, ?properties, "opened audio device");

        Ok(Self {
            properties,
            device_name,
            sample_format,
            output_device,
            output_config,
            input,
            streams: Vec::new(),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// List available output devices.
    pub fn list_output_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        host.output_devices()?
            .enumerate()
            .map(|(index, device)| Ok(DeviceInfo { index, name: device.name()? }))
            .collect()
    }

    /// List available input devices.
    pub fn list_input_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        host.input_devices()?
            .enumerate()
            .map(|(index, device)| Ok(DeviceInfo { index, name: device.name()? }))
            .collect()
    }

    fn build_streams<T: NativeSample>(&self, handler: SharedBufferSwitch) -> Result<Vec<StreamHandle>> {
        let frames = self.properties.buffer_frames;
        let format = self.properties.format;
        let mut streams = Vec::with_capacity(2);

        let mut consumer = None;
        if let Some((device, config)) = &self.input {
            let channels = config.channels as usize;
            let ring = HeapRb::<T>::new(frames * channels * INPUT_RING_BLOCKS);
            let (mut producer, ring_consumer) = ring.split();
            let stream = device.build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    // Overrun drops the newest samples
                    let _ = producer.push_slice(data);
                },
                |err| tracing::warn!("audio input stream error: {err}"),
                None,
            )?;
            streams.push(StreamHandle(stream));
            consumer = Some(ring_consumer);
        }

        let mut renderer = BlockRenderer {
            handler,
            inputs: NativeBuffers::new(self.properties.num_inputs, frames, format),
            outputs: NativeBuffers::new(self.properties.num_outputs, frames, format),
            consumer,
            interleaved: vec![T::SILENCE; frames * self.properties.num_inputs],
            cursor: frames,
        };

        let stream = self.output_device.build_output_stream(
            &self.output_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    renderer.fill(data);
                }));
                if result.is_err() {
                    // Panic in callback - output silence
                    data.fill(T::SILENCE);
                }
            },
            |err| tracing::warn!("audio output stream error: {err}"),
            None,
        )?;
        streams.push(StreamHandle(stream));

        Ok(streams)
    }
}

impl AudioDriver for CpalDriver {
    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn start(&mut self, handler: SharedBufferSwitch) -> Result<()> {
        if !self.streams.is_empty() {
            return Err(Error::AlreadyRunning);
        }

        let streams = match self.sample_format {
            cpal::SampleFormat::I16 => self.build_streams::<i16>(handler)?,
            cpal::SampleFormat::I32 => self.build_streams::<i32>(handler)?,
            cpal::SampleFormat::F32 => self.build_streams::<f32>(handler)?,
            cpal::SampleFormat::F64 => self.build_streams::<f64>(handler)?,
            other => return Err(Error::UnsupportedFormat(format!("{other:?}"))),
        };
        for stream in &streams {
            stream.0.play()?;
        }
        self.streams = streams;

        tracing::info!(device = %self.device_name, "audio stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.streams.is_empty() {
            return Ok(());
        }
        // Dropping a stream waits for its callback to return
        self.streams.clear();
        tracing::info!(device = %self.device_name, "audio stream stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        !self.streams.is_empty()
    }
}

/// Output-callback state: re-blocks CPAL callbacks into fixed blocks.
struct BlockRenderer<T> {
    handler: SharedBufferSwitch,
    inputs: NativeBuffers,
    outputs: NativeBuffers,
    consumer: Option<HeapCons<T>>,
    interleaved: Vec<T>,
    /// Next frame of `outputs` to hand to CPAL.
    cursor: usize,
}

impl<T: NativeSample> BlockRenderer<T> {
    fn fill(&mut self, data: &mut [T]) {
        let channels = self.outputs.num_channels();
        if channels == 0 {
            return;
        }
        for frame in data.chunks_exact_mut(channels) {
            if self.cursor == self.outputs.frames() {
                self.render();
                self.cursor = 0;
            }
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = T::read(self.outputs.channel(channel), self.cursor);
            }
            self.cursor += 1;
        }
    }

    fn render(&mut self) {
        let channels = self.inputs.num_channels();
        if let (Some(consumer), true) = (&mut self.consumer, channels > 0) {
            let read = consumer.pop_slice(&mut self.interleaved);
            self.interleaved[read..].fill(T::SILENCE);
            for (frame, samples) in self.interleaved.chunks_exact(channels).enumerate() {
                for (channel, sample) in samples.iter().enumerate() {
                    sample.write(self.inputs.channel_mut(channel), frame);
                }
            }
        }
        switch_or_silence(&self.handler, &self.inputs, &mut self.outputs);
    }
}

/// CPAL sample types the driver can stream, read from and written to native
/// byte buffers.
trait NativeSample: cpal::SizedSample + Send + 'static {
    const SILENCE: Self;

    fn read(buffer: &[u8], frame: usize) -> Self;

    fn write(&self, buffer: &mut [u8], frame: usize);
}

macro_rules! native_sample {
    ($ty:ty, $silence:expr) => {
        impl NativeSample for $ty {
            const SILENCE: Self = $silence;

            #[inline]
            fn read(buffer: &[u8], frame: usize) -> Self {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let mut bytes = [0u8; WIDTH];
                if let Some(src) = buffer.get(frame * WIDTH..(frame + 1) * WIDTH) {
                    bytes.copy_from_slice(src);
                }
                <$ty>::from_ne_bytes(bytes)
            }

            #[inline]
            fn write(&self, buffer: &mut [u8], frame: usize) {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                if let Some(dst) = buffer.get_mut(frame * WIDTH..(frame + 1) * WIDTH) {
                    dst.copy_from_slice(&self.to_ne_bytes());
                }
            }
        }
    };
}

native_sample!(i16, 0);
native_sample!(i32, 0);
native_sample!(f32, 0.0);
native_sample!(f64, 0.0);

fn native_format(format: cpal::SampleFormat) -> Result<SampleFormat> {
    match format {
        cpal::SampleFormat::I16 => Ok(SampleFormat::Int16),
        cpal::SampleFormat::I32 => Ok(SampleFormat::Int32),
        cpal::SampleFormat::F32 => Ok(SampleFormat::Float32),
        cpal::SampleFormat::F64 => Ok(SampleFormat::Float64),
        other => Err(Error::UnsupportedFormat(format!("{other:?}"))),
    }
}

/// Pick the output stream config: Int32 when preferred and available at the
/// requested rate, otherwise the device default format.
fn choose_output_config(
    device: &cpal::Device,
    config: &CpalConfig,
) -> Result<cpal::SupportedStreamConfig> {
    let default = device.default_output_config()?;
    let rate = config
        .sample_rate
        .map_or(default.sample_rate(), cpal::SampleRate);

    let mut fallback = None;
    for range in device.supported_output_configs()? {
        if range.min_sample_rate() > rate || range.max_sample_rate() < rate {
            continue;
        }
        if config.prefer_int32 && range.sample_format() == cpal::SampleFormat::I32 {
            return Ok(range.with_sample_rate(rate));
        }
        if fallback.is_none() && range.sample_format() == default.sample_format() {
            fallback = Some(range.with_sample_rate(rate));
        }
    }

    match (fallback, config.sample_rate) {
        (Some(found), _) => Ok(found),
        (None, None) => Ok(default),
        (None, Some(requested)) => Err(Error::InvalidConfig(format!(
            "sample rate {requested} not supported by device"
        ))),
    }
}

/// Block length and the stream buffer size that delivers it.
///
/// The stream is fixed to the block length whenever the backend reports a
/// range, so each callback covers one block and MIDI drains once per
/// buffer period.
fn stream_buffer_size(
    requested: Option<u32>,
    supported: &cpal::SupportedBufferSize,
) -> (u32, cpal::BufferSize) {
    match (requested, supported) {
        (Some(frames), _) => (frames, cpal::BufferSize::Fixed(frames)),
        (None, cpal::SupportedBufferSize::Range { min, max }) => {
            let frames = DEFAULT_BUFFER_FRAMES.max(*min).min(*max);
            (frames, cpal::BufferSize::Fixed(frames))
        }
        (None, cpal::SupportedBufferSize::Unknown) => {
            (DEFAULT_BUFFER_FRAMES, cpal::BufferSize::Default)
        }
    }
}

/// Input side of a duplex device: same name (or the default input), same
/// sample format and rate as the output stream.
fn matching_input(
    host: &cpal::Host,
    name: Option<&str>,
    format: cpal::SampleFormat,
    rate: cpal::SampleRate,
) -> Option<(cpal::Device, cpal::StreamConfig)> {
    let device = match name {
        Some(name) => host
            .input_devices()
            .ok()?
            .find(|device| device.name().is_ok_and(|n| n == name))?,
        None => host.default_input_device()?,
    };
    let range = device.supported_input_configs().ok()?.find(|range| {
        range.sample_format() == format
            && range.min_sample_rate() <= rate
            && rate <= range.max_sample_rate()
    })?;
    let config = range.with_sample_rate(rate).config();
    Some((device, config))
}
