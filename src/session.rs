//! A running host: one audio driver, one plugin, optionally one MIDI input.

use crate::builder::SessionBuilder;
use crate::Result;
use crossbeam_channel::Receiver;
use ostinato_core::{
    AudioDriver, BlockProcessor, DeviceProperties, PluginBridge, PluginProperties,
    SharedBufferSwitch,
};
use ostinato_plugin::HostNotification;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "midi-hardware")]
use ostinato_midi_io::MidiInputDevice;

/// Owns the driver, the MIDI input and the block processor (which owns the
/// plugin).
///
/// Every method here runs on the application thread. Those that reach the
/// plugin take the processor lock; while it is held the audio callback
/// outputs silence instead of waiting.
pub struct Session {
    // Fields drop in declaration order: plugin, then MIDI, then driver.
    processor: Arc<Mutex<BlockProcessor>>,
    #[cfg(feature = "midi-hardware")]
    midi: Option<MidiInputDevice>,
    driver: Box<dyn AudioDriver>,
    notifications: Receiver<HostNotification>,
    running: bool,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub(crate) fn from_parts(
        driver: Box<dyn AudioDriver>,
        #[cfg(feature = "midi-hardware")] midi: Option<MidiInputDevice>,
        processor: BlockProcessor,
        notifications: Receiver<HostNotification>,
    ) -> Self {
        Self {
            processor: Arc::new(Mutex::new(processor)),
            #[cfg(feature = "midi-hardware")]
            midi,
            driver,
            notifications,
            running: false,
        }
    }

    /// Resume the plugin, start MIDI input, then start the stream. MIDI
    /// timing restarts here, so the first block is timed from this call.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.processor.lock().plugin_mut().resume();
        #[cfg(feature = "midi-hardware")]
        if let Some(midi) = &self.midi {
            midi.start();
        }
        self.processor.lock().reset_midi_timing();

        let handler: SharedBufferSwitch = self.processor.clone();
        if let Err(e) = self.driver.start(handler) {
            #[cfg(feature = "midi-hardware")]
            if let Some(midi) = &self.midi {
                midi.stop();
            }
            self.processor.lock().plugin_mut().suspend();
            return Err(e.into());
        }

        self.running = true;
        info!("session started");
        Ok(())
    }

    /// Stop the stream, then MIDI input, then suspend the plugin.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.driver.stop()?;
        self.running = false;
        #[cfg(feature = "midi-hardware")]
        if let Some(midi) = &self.midi {
            midi.stop();
        }
        self.processor.lock().plugin_mut().suspend();
        info!("session stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn device_properties(&self) -> DeviceProperties {
        *self.driver.properties()
    }

    pub fn plugin_properties(&self) -> PluginProperties {
        self.processor.lock().plugin_properties()
    }

    #[cfg(feature = "midi-hardware")]
    pub fn midi_input_name(&self) -> Option<&str> {
        self.midi.as_ref().map(|m| m.name())
    }

    pub fn has_midi(&self) -> bool {
        self.processor.lock().has_midi()
    }

    /// Blocks the processor has run.
    pub fn blocks_processed(&self) -> u64 {
        self.processor.lock().blocks()
    }

    /// MIDI messages drained past the first batch of a block.
    pub fn dropped_midi(&self) -> u64 {
        self.processor.lock().dropped_midi()
    }

    /// Run `f` on the plugin with the processor locked.
    pub fn with_plugin<R>(&self, f: impl FnOnce(&mut dyn PluginBridge) -> R) -> R {
        let mut processor = self.processor.lock();
        f(processor.plugin_mut())
    }

    pub fn editor_size(&self) -> Option<(u32, u32)> {
        self.with_plugin(|plugin| plugin.editor_size())
    }

    /// Embed the editor in `parent`, a native window handle.
    pub fn open_editor(&self, parent: *mut c_void) {
        self.with_plugin(|plugin| plugin.open_editor(parent));
    }

    pub fn close_editor(&self) {
        self.with_plugin(|plugin| plugin.close_editor());
    }

    pub fn is_editor_open(&self) -> bool {
        self.with_plugin(|plugin| plugin.is_editor_open())
    }

    pub fn editor_idle(&self) {
        self.with_plugin(|plugin| plugin.editor_idle());
    }

    pub fn save_program(&self, path: &Path) -> Result<usize> {
        Ok(self.with_plugin(|plugin| ostinato_plugin::save_program(plugin, path))?)
    }

    pub fn load_program(&self, path: &Path) -> Result<usize> {
        Ok(self.with_plugin(|plugin| ostinato_plugin::load_program(plugin, path))?)
    }

    /// Notifications the plugin sent since the last call.
    pub fn poll_host_notifications(&self) -> Vec<HostNotification> {
        self.notifications.try_iter().collect()
    }

    pub fn notifications(&self) -> &Receiver<HostNotification> {
        &self.notifications
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop session cleanly");
        }
    }
}
