//! Per-block pipeline between driver buffers and the plugin.
//!
//! One [`BlockProcessor::process`] call per hardware buffer period:
//!
//! 1. decode routed driver inputs into plugin inputs
//! 2. collect this block's MIDI and hand it to the plugin
//! 3. run the plugin
//! 4. encode routed plugin outputs into driver outputs
//!
//! Routing in each direction covers `min(driver channels, plugin channels)`.
//! Plugin inputs without a driver channel and driver outputs without a
//! plugin channel are zeroed every block.

use crate::buffers::{ChannelBufferSet, NativeBuffers};
use crate::driver::BufferSwitchHandler;
use crate::format::{decode_int32, encode_int32, DeviceProperties};
use crate::midi::{MidiEventAdapter, MidiInputQueue};
use crate::plugin::{PluginBridge, PluginProperties};

/// What happened during one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The plugin ran; `events` MIDI events were delivered.
    Processed { events: usize },
    /// Unsupported native format: outputs zeroed, plugin not invoked.
    Silenced,
}

/// Owns the plugin, the MIDI source and every per-block buffer.
pub struct BlockProcessor {
    device: DeviceProperties,
    plugin_properties: PluginProperties,
    plugin: Box<dyn PluginBridge>,
    midi: Option<Box<dyn MidiInputQueue>>,
    adapter: MidiEventAdapter,
    driver_inputs: ChannelBufferSet,
    plugin_inputs: ChannelBufferSet,
    plugin_outputs: ChannelBufferSet,
    driver_outputs: ChannelBufferSet,
    blocks: u64,
}

impl BlockProcessor {
    /// Size all buffers for `device` and the plugin's channel counts.
    pub fn new(
        device: DeviceProperties,
        plugin: Box<dyn PluginBridge>,
        midi: Option<Box<dyn MidiInputQueue>>,
        midi_capacity: usize,
    ) -> Self {
        let plugin_properties = plugin.properties();
        let frames = device.buffer_frames;

        tracing::debug!(
            ?device,
            ?plugin_properties,
            midi = midi.is_some(),
            "allocating block buffers"
        );

        Self {
            device,
            plugin_properties,
            plugin,
            midi,
            adapter: MidiEventAdapter::new(midi_capacity),
            driver_inputs: ChannelBufferSet::new(device.num_inputs, frames),
            plugin_inputs: ChannelBufferSet::new(plugin_properties.num_inputs, frames),
            plugin_outputs: ChannelBufferSet::new(plugin_properties.num_outputs, frames),
            driver_outputs: ChannelBufferSet::new(device.num_outputs, frames),
            blocks: 0,
        }
    }

    pub fn device(&self) -> &DeviceProperties {
        &self.device
    }

    pub fn plugin_properties(&self) -> PluginProperties {
        self.plugin_properties
    }

    pub fn plugin(&self) -> &dyn PluginBridge {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn PluginBridge {
        self.plugin.as_mut()
    }

    pub fn has_midi(&self) -> bool {
        self.midi.is_some()
    }

    /// MIDI messages discarded because they arrived after the first full
    /// batch of a block.
    pub fn dropped_midi(&self) -> u64 {
        self.adapter.dropped()
    }

    /// Blocks processed so far, silenced ones included.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Restart MIDI timing so the first block is timed from stream start.
    pub fn reset_midi_timing(&mut self) {
        if let Some(queue) = self.midi.as_deref_mut() {
            queue.reset_timing();
        }
    }

    /// Take the plugin out, destroying the processor.
    pub fn into_plugin(self) -> Box<dyn PluginBridge> {
        self.plugin
    }

    /// Run one block.
    pub fn process(&mut self, inputs: &NativeBuffers, outputs: &mut NativeBuffers) -> BlockOutcome {
        self.blocks += 1;

        if !self.device.format.is_convertible() || !inputs.format().is_convertible() {
            outputs.fill_silence();
            return BlockOutcome::Silenced;
        }

        let frames = self.device.buffer_frames;

        let routed_inputs = inputs
            .num_channels()
            .min(self.driver_inputs.num_channels())
            .min(self.plugin_inputs.num_channels());
        for channel in 0..routed_inputs {
            decode_int32(inputs.channel(channel), self.driver_inputs.channel_mut(channel));
            self.plugin_inputs
                .channel_mut(channel)
                .copy_from_slice(self.driver_inputs.channel(channel));
        }
        self.plugin_inputs.clear_from(routed_inputs);

        let mut delivered = 0;
        if let Some(queue) = self.midi.as_deref_mut() {
            let events = self.adapter.collect(queue, frames, self.device.sample_rate);
            if !events.is_empty() {
                delivered = self.plugin.set_block_events(events);
            }
        }

        self.plugin
            .process_block(&mut self.plugin_inputs, &mut self.plugin_outputs, frames);

        let routed_outputs = self
            .plugin_outputs
            .num_channels()
            .min(self.driver_outputs.num_channels());
        for channel in 0..routed_outputs {
            self.driver_outputs
                .channel_mut(channel)
                .copy_from_slice(self.plugin_outputs.channel(channel));
        }
        self.driver_outputs.clear_from(routed_outputs);

        let encoded = outputs.num_channels().min(self.driver_outputs.num_channels());
        for channel in 0..encoded {
            encode_int32(self.driver_outputs.channel(channel), outputs.channel_mut(channel));
        }

        BlockOutcome::Processed { events: delivered }
    }
}

impl BufferSwitchHandler for BlockProcessor {
    fn buffer_switch(&mut self, inputs: &NativeBuffers, outputs: &mut NativeBuffers) {
        self.process(inputs, outputs);
    }
}
