//! VST2 plugin bridge for the ostinato host.
//!
//! [`Vst2Plugin`] loads a plugin binary in-process and implements
//! [`ostinato_core::PluginBridge`]. Requests the plugin makes back to the
//! host are answered from a [`HostIdentity`] and surfaced as
//! [`HostNotification`]s.
//!
//! # Example
//!
//! ```ignore
//! use ostinato_plugin::{notification_channel, HostIdentity, Vst2Plugin};
//!
//! let (handler, notifications) = notification_channel(256);
//! let mut plugin = Vst2Plugin::load(path, HostIdentity::default(), Arc::new(handler))?;
//! plugin.open();
//! plugin.set_sample_rate(48000.0);
//! ```

pub mod abi;

pub mod error;
pub use error::{BridgeError, LoadStage, Result};

mod events;
pub use events::{PluginEventBatch, MAX_BLOCK_EVENTS};

mod host;
pub use host::{
    notification_channel, ChannelHostHandler, HostContext, HostEventHandler, HostIdentity,
    HostNotification, IgnoreNotifications,
};

pub mod preset;
pub use preset::{load_program, save_program};

mod vst2;
pub use vst2::Vst2Plugin;
