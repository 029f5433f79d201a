//! # Ostinato - Real-time Plugin Host
//!
//! One audio device drives one VST2 plugin, with live MIDI input merged into
//! the same block timing.
//!
//! ## Architecture
//!
//! Ostinato is an umbrella crate that coordinates:
//! - **ostinato-core** - Block pipeline (sample conversion, MIDI timing, routing, drivers)
//! - **ostinato-midi-io** - MIDI input devices and the lock-free input queue
//! - **ostinato-plugin** - VST2 bridge (loading, host callbacks, presets)
//!
//! ## Quick Start
//!
//! ```ignore
//! use ostinato::prelude::*;
//!
//! let config = HostConfig::load(Path::new("host.toml"))?;
//! let mut session = SessionBuilder::from_config(config).build()?;
//! session.start()?;
//!
//! for notification in session.poll_host_notifications() {
//!     println!("{notification:?}");
//! }
//! session.stop()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cpal` - Hardware audio through CPAL (default)
//! - `midi-hardware` - Hardware MIDI input through midir (default)

/// Re-export of ostinato-core for direct access
pub use ostinato_core as core;
pub use ostinato_midi_io as midi_io;
pub use ostinato_plugin as plugin;

pub mod builder;
pub mod config;
pub mod error;
pub mod session;

pub use builder::SessionBuilder;
pub use config::HostConfig;
pub use error::{Error, Result};
pub use session::Session;

pub use ostinato_core::{
    AudioDriver, BlockProcessor, ChunkKind, DeviceProperties, MidiInputQueue, PluginBridge,
    PluginProperties, SampleFormat,
};
pub use ostinato_plugin::{HostIdentity, HostNotification};

pub mod prelude {
    pub use crate::{
        AudioDriver, ChunkKind, DeviceProperties, HostConfig, HostIdentity, HostNotification,
        PluginBridge, PluginProperties, SampleFormat, Session, SessionBuilder,
    };
    pub use ostinato_core::driver::{ManualDriver, ManualTrigger};
    #[cfg(feature = "cpal")]
    pub use ostinato_core::driver::{CpalConfig, CpalDriver};
    pub use std::path::Path;
}
