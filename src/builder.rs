//! Builder for configuring and constructing a [`Session`].

use crate::config::HostConfig;
use crate::session::Session;
use crate::{Error, Result};
use ostinato_core::{AudioDriver, BlockProcessor, MidiInputQueue, PluginBridge};
use ostinato_plugin::{notification_channel, HostIdentity, Vst2Plugin};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "midi-hardware")]
use ostinato_midi_io::{InputMode, MidiInputDevice};

/// Components not given explicitly are created from the config: the CPAL
/// driver (with the `cpal` feature), the MIDI input named in `midi.input`
/// (with `midi-hardware`) and the VST2 plugin at `plugin.path`.
///
/// A MIDI input that fails to open is logged and skipped; the session runs
/// without MIDI. A failed audio device or plugin load fails the build.
///
/// # Example
///
/// ```ignore
/// use ostinato::prelude::*;
///
/// let mut session = Session::builder()
///     .plugin_path("/usr/lib/vst/synth.so")
///     .midi_input("Keystation 49")
///     .buffer_frames(256)
///     .build()?;
/// session.start()?;
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    config: HostConfig,
    driver: Option<Box<dyn AudioDriver>>,
    plugin: Option<Box<dyn PluginBridge>>,
    midi_queue: Option<Box<dyn MidiInputQueue>>,
}

impl SessionBuilder {
    pub fn from_config(config: HostConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn audio_device(mut self, name: impl Into<String>) -> Self {
        self.config.audio.device = Some(name.into());
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.audio.sample_rate = Some(rate);
        self
    }

    pub fn buffer_frames(mut self, frames: u32) -> Self {
        self.config.audio.buffer_frames = Some(frames);
        self
    }

    /// Default: true
    pub fn prefer_int32(mut self, prefer: bool) -> Self {
        self.config.audio.prefer_int32 = prefer;
        self
    }

    pub fn midi_input(mut self, name: impl Into<String>) -> Self {
        self.config.midi.input = Some(name.into());
        self
    }

    /// Default: 2048
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.midi.queue_capacity = capacity;
        self
    }

    pub fn plugin_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plugin.path = Some(path.into());
        self
    }

    pub fn preset(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plugin.preset = Some(path.into());
        self
    }

    pub fn host_identity(mut self, identity: HostIdentity) -> Self {
        self.config.host.vendor = identity.vendor;
        self.config.host.product = identity.product;
        self.config.host.version = identity.version;
        self
    }

    /// Use `driver` instead of opening a CPAL device.
    pub fn driver(mut self, driver: Box<dyn AudioDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Use an already loaded plugin instead of `plugin.path`. Host
    /// notifications from it are not routed to the session.
    pub fn plugin(mut self, plugin: Box<dyn PluginBridge>) -> Self {
        self.plugin = Some(plugin);
        self
    }

    /// Use `queue` as the MIDI source instead of a hardware input.
    pub fn midi_queue(mut self, queue: Box<dyn MidiInputQueue>) -> Self {
        self.midi_queue = Some(queue);
        self
    }

    pub fn build(self) -> Result<Session> {
        let Self {
            config,
            driver,
            plugin,
            mut midi_queue,
        } = self;
        config.validate()?;

        let driver = match driver {
            Some(driver) => driver,
            None => open_default_driver(&config)?,
        };
        let device = *driver.properties();

        #[cfg(feature = "midi-hardware")]
        let mut midi_device = None;
        #[cfg(feature = "midi-hardware")]
        if midi_queue.is_none() {
            if let Some(name) = &config.midi.input {
                let mode = InputMode::Queue {
                    capacity: config.midi.queue_capacity,
                };
                match MidiInputDevice::open_by_name(name, mode) {
                    Ok((device, reader)) => {
                        midi_queue = reader.map(|r| Box::new(r) as Box<dyn MidiInputQueue>);
                        midi_device = Some(device);
                    }
                    Err(e) => {
                        tracing::warn!(input = %name, error = %e, "MIDI input unavailable, continuing without MIDI");
                    }
                }
            }
        }
        #[cfg(not(feature = "midi-hardware"))]
        if midi_queue.is_none() {
            if let Some(name) = &config.midi.input {
                tracing::warn!(input = %name, "built without midi-hardware, continuing without MIDI");
            }
        }

        let (handler, notifications) = notification_channel(config.plugin.notification_capacity);
        let mut plugin: Box<dyn PluginBridge> = match plugin {
            Some(plugin) => plugin,
            None => {
                let path = config
                    .plugin
                    .path
                    .as_deref()
                    .ok_or(Error::MissingComponent("a plugin (plugin.path)"))?;
                Box::new(Vst2Plugin::load(path, config.host_identity(), Arc::new(handler))?)
            }
        };

        plugin.open();
        plugin.set_sample_rate(device.sample_rate as f32);
        plugin.set_block_size(device.buffer_frames);
        if let Some(preset) = &config.plugin.preset {
            ostinato_plugin::load_program(plugin.as_mut(), preset)?;
        }

        let processor =
            BlockProcessor::new(device, plugin, midi_queue, config.midi.queue_capacity);

        tracing::info!(
            sample_rate = device.sample_rate,
            format = %device.format,
            frames = device.buffer_frames,
            midi = processor.has_midi(),
            "session built"
        );

        Ok(Session::from_parts(
            driver,
            #[cfg(feature = "midi-hardware")]
            midi_device,
            processor,
            notifications,
        ))
    }
}

#[cfg(feature = "cpal")]
fn open_default_driver(config: &HostConfig) -> Result<Box<dyn AudioDriver>> {
    let driver = ostinato_core::driver::CpalDriver::open(&config.cpal_config())?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "cpal"))]
fn open_default_driver(_config: &HostConfig) -> Result<Box<dyn AudioDriver>> {
    Err(Error::MissingComponent("an audio driver"))
}
