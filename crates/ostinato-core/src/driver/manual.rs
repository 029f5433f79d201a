//! Driver that renders blocks on demand instead of on a hardware clock.

use super::{switch_or_silence, AudioDriver, SharedBufferSwitch};
use crate::buffers::NativeBuffers;
use crate::format::DeviceProperties;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

struct ManualStream {
    handler: Option<SharedBufferSwitch>,
    inputs: NativeBuffers,
    outputs: NativeBuffers,
}

/// In-process driver for offline rendering and tests.
///
/// Blocks are rendered through a [`ManualTrigger`], which stays valid after
/// the driver itself is handed to a session.
pub struct ManualDriver {
    properties: DeviceProperties,
    stream: Arc<Mutex<ManualStream>>,
}

impl ManualDriver {
    pub fn new(properties: DeviceProperties) -> Self {
        let stream = ManualStream {
            handler: None,
            inputs: NativeBuffers::new(
                properties.num_inputs,
                properties.buffer_frames,
                properties.format,
            ),
            outputs: NativeBuffers::new(
                properties.num_outputs,
                properties.buffer_frames,
                properties.format,
            ),
        };
        Self {
            properties,
            stream: Arc::new(Mutex::new(stream)),
        }
    }

    pub fn trigger(&self) -> ManualTrigger {
        ManualTrigger {
            stream: Arc::clone(&self.stream),
        }
    }
}

impl AudioDriver for ManualDriver {
    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn start(&mut self, handler: SharedBufferSwitch) -> Result<()> {
        let mut stream = self.stream.lock();
        if stream.handler.is_some() {
            return Err(Error::AlreadyRunning);
        }
        stream.outputs.fill_silence();
        stream.handler = Some(handler);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stream.lock().handler = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stream.lock().handler.is_some()
    }
}

/// Handle that feeds input and renders blocks on a [`ManualDriver`].
#[derive(Clone)]
pub struct ManualTrigger {
    stream: Arc<Mutex<ManualStream>>,
}

impl ManualTrigger {
    /// Render one block. Returns `false` when the driver is stopped or the
    /// handler was busy (the block is then silent).
    pub fn run_block(&self) -> bool {
        let mut guard = self.stream.lock();
        let stream = &mut *guard;
        match &stream.handler {
            Some(handler) => switch_or_silence(handler, &stream.inputs, &mut stream.outputs),
            None => false,
        }
    }

    /// Overwrite one native input channel. Extra bytes are ignored.
    pub fn set_input(&self, channel: usize, bytes: &[u8]) {
        let mut stream = self.stream.lock();
        let target = stream.inputs.channel_mut(channel);
        let len = target.len().min(bytes.len());
        target[..len].copy_from_slice(&bytes[..len]);
    }

    /// Copy of one native output channel from the last block.
    pub fn output(&self, channel: usize) -> Vec<u8> {
        self.stream.lock().outputs.channel(channel).to_vec()
    }

    /// Overwrite one native output channel, e.g. to detect untouched memory.
    pub fn fill_output(&self, channel: usize, byte: u8) {
        self.stream.lock().outputs.channel_mut(channel).fill(byte);
    }
}
