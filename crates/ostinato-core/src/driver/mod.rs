//! Audio driver seam.
//!
//! A driver owns the hardware stream and calls a [`BufferSwitchHandler`]
//! once per block with native input and output buffers.

use crate::buffers::NativeBuffers;
use crate::format::DeviceProperties;
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "cpal")]
mod cpal_driver;
#[cfg(feature = "cpal")]
pub use cpal_driver::{CpalConfig, CpalDriver};

mod manual;
pub use manual::{ManualDriver, ManualTrigger};

/// Receiver of the driver's buffer-ready notification.
pub trait BufferSwitchHandler: Send {
    /// Fill `outputs` for the block whose input is `inputs`.
    fn buffer_switch(&mut self, inputs: &NativeBuffers, outputs: &mut NativeBuffers);
}

/// Handler shared between the application and the driver's audio thread.
/// Drivers only ever `try_lock` it; a contended block is output as silence.
pub type SharedBufferSwitch = Arc<Mutex<dyn BufferSwitchHandler>>;

/// An audio device as listed by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
}

/// One opened audio device.
pub trait AudioDriver {
    /// Stream properties, fixed since the device was opened.
    fn properties(&self) -> &DeviceProperties;

    /// Begin calling `handler` once per block.
    fn start(&mut self, handler: SharedBufferSwitch) -> Result<()>;

    /// Stop the stream. No handler call is in flight or pending on return.
    fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;
}

/// Run one block through `handler`, or output silence if it is busy.
pub(crate) fn switch_or_silence(
    handler: &SharedBufferSwitch,
    inputs: &NativeBuffers,
    outputs: &mut NativeBuffers,
) -> bool {
    match handler.try_lock() {
        Some(mut guard) => {
            guard.buffer_switch(inputs, outputs);
            true
        }
        None => {
            outputs.fill_silence();
            false
        }
    }
}
