//! Real-time block pipeline for a single-plugin audio host.
//!
//! # Primary API
//!
//! - [`BlockProcessor`]: converts, routes and runs one hardware block
//! - [`MidiEventAdapter`]: drains a [`MidiInputQueue`] into block-timed events
//! - [`PluginBridge`]: the operations the host performs on a plugin
//! - [`AudioDriver`] / [`BufferSwitchHandler`]: the driver seam
//!
//! # Feature-gated APIs
//!
//! - `"cpal"`: [`driver::CpalDriver`] hardware audio I/O (enabled by default)
//!
//! # Example
//!
//! ```ignore
//! use ostinato_core::prelude::*;
//!
//! let mut driver = CpalDriver::open(&CpalConfig::default())?;
//! let processor = BlockProcessor::new(*driver.properties(), plugin, None, 2048);
//! let shared: SharedBufferSwitch = Arc::new(Mutex::new(processor));
//! driver.start(shared)?;
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod buffers;
pub use buffers::{ChannelBufferSet, NativeBuffers};

pub mod format;
pub use format::{DeviceProperties, SampleFormat};

pub mod midi;
pub use midi::{BlockMidiEvent, MidiEventAdapter, MidiInputQueue, RawMidiMessage};

pub mod plugin;
pub use plugin::{ChunkKind, PluginBridge, PluginProperties};

pub mod processor;
pub use processor::{BlockOutcome, BlockProcessor};

pub mod driver;
pub use driver::{AudioDriver, BufferSwitchHandler, DeviceInfo, SharedBufferSwitch};

pub mod prelude {
    pub use crate::driver::{ManualDriver, ManualTrigger};
    #[cfg(feature = "cpal")]
    pub use crate::driver::{CpalConfig, CpalDriver};
    pub use crate::{
        AudioDriver, BlockMidiEvent, BlockProcessor, BufferSwitchHandler, ChannelBufferSet,
        ChunkKind, DeviceProperties, MidiInputQueue, NativeBuffers, PluginBridge,
        PluginProperties, RawMidiMessage, SampleFormat, SharedBufferSwitch,
    };
    pub use parking_lot::Mutex;
    pub use std::sync::Arc;
}
