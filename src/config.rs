//! Host configuration, read from TOML.
//!
//! ```toml
//! [audio]
//! device = "Focusrite USB"
//! buffer_frames = 256
//!
//! [midi]
//! input = "Keystation 49"
//!
//! [plugin]
//! path = "/usr/lib/vst/synth.so"
//! preset = "patches/lead.preset"
//! ```

use crate::{Error, Result};
use ostinato_plugin::{HostIdentity, MAX_BLOCK_EVENTS};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub audio: AudioConfig,
    pub midi: MidiConfig,
    pub plugin: PluginConfig,
    pub host: HostSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    /// Device name; unset uses the default device.
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_frames: Option<u32>,
    pub prefer_int32: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: None,
            buffer_frames: None,
            prefer_int32: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MidiConfig {
    /// Input port name; unset runs without MIDI.
    pub input: Option<String>,
    /// Messages drained per block.
    pub queue_capacity: usize,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input: None,
            queue_capacity: ostinato_core::midi::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    pub path: Option<PathBuf>,
    /// Preset file loaded after the plugin opens.
    pub preset: Option<PathBuf>,
    /// Host notifications buffered before new ones are dropped.
    pub notification_capacity: usize,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            path: None,
            preset: None,
            notification_capacity: 256,
        }
    }
}

/// Identity reported to the plugin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSection {
    pub vendor: String,
    pub product: String,
    pub version: i32,
}

impl Default for HostSection {
    fn default() -> Self {
        let identity = HostIdentity::default();
        Self {
            vendor: identity.vendor,
            product: identity.product,
            version: identity.version,
        }
    }
}

impl From<&HostSection> for HostIdentity {
    fn from(section: &HostSection) -> Self {
        HostIdentity {
            vendor: section.vendor.clone(),
            product: section.product.clone(),
            version: section.version,
        }
    }
}

impl HostConfig {
    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: HostConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.audio.sample_rate {
            if !(8000..=384000).contains(&rate) {
                return Err(Error::InvalidConfig(format!(
                    "audio.sample_rate {rate} out of range (8000-384000 Hz)"
                )));
            }
        }
        if let Some(frames) = self.audio.buffer_frames {
            if !(16..=8192).contains(&frames) {
                return Err(Error::InvalidConfig(format!(
                    "audio.buffer_frames {frames} out of range (16-8192)"
                )));
            }
        }
        if !(1..=MAX_BLOCK_EVENTS).contains(&self.midi.queue_capacity) {
            return Err(Error::InvalidConfig(format!(
                "midi.queue_capacity {} out of range (1-{MAX_BLOCK_EVENTS})",
                self.midi.queue_capacity
            )));
        }
        if self.plugin.notification_capacity == 0 {
            return Err(Error::InvalidConfig(
                "plugin.notification_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn host_identity(&self) -> HostIdentity {
        HostIdentity::from(&self.host)
    }

    #[cfg(feature = "cpal")]
    pub fn cpal_config(&self) -> ostinato_core::driver::CpalConfig {
        ostinato_core::driver::CpalConfig {
            device: self.audio.device.clone(),
            sample_rate: self.audio.sample_rate,
            buffer_frames: self.audio.buffer_frames,
            prefer_int32: self.audio.prefer_int32,
        }
    }
}
