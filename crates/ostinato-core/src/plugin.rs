//! Plugin seam used by the block processor.

use crate::buffers::ChannelBufferSet;
use crate::midi::BlockMidiEvent;
use std::ffi::c_void;

/// Static shape of a loaded plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PluginProperties {
    pub num_inputs: usize,
    pub num_outputs: usize,
    /// Plugin accepts MIDI events. Negotiated once at load.
    pub is_instrument: bool,
}

/// Which opaque state blob to exchange with the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Bank,
    Program,
}

/// Operations the host performs on one plugin instance.
///
/// `process_block` and `set_block_events` run on the audio thread and must
/// not allocate or block. Everything else is setup or UI work.
pub trait PluginBridge: Send {
    fn open(&mut self);

    fn set_sample_rate(&mut self, rate: f32);

    fn set_block_size(&mut self, frames: usize);

    /// Switch processing on.
    fn resume(&mut self) {}

    /// Switch processing off.
    fn suspend(&mut self) {}

    fn properties(&self) -> PluginProperties;

    /// Render `frames` samples. `inputs` and `outputs` hold at least
    /// `num_inputs` / `num_outputs` channels.
    fn process_block(
        &mut self,
        inputs: &mut ChannelBufferSet,
        outputs: &mut ChannelBufferSet,
        frames: usize,
    );

    /// Hand this block's events to the plugin. Returns how many were
    /// delivered; counts above capacity are truncated and an empty slice is
    /// a no-op.
    fn set_block_events(&mut self, events: &[BlockMidiEvent]) -> usize;

    fn parameter_count(&self) -> usize {
        0
    }

    fn parameter(&self, _index: usize) -> f32 {
        0.0
    }

    fn set_parameter(&mut self, _index: usize, _value: f32) {}

    /// Opaque plugin state, empty if unsupported.
    fn chunk(&mut self, _kind: ChunkKind) -> Vec<u8> {
        Vec::new()
    }

    fn set_chunk(&mut self, _kind: ChunkKind, _data: &[u8]) {}

    /// Editor width and height, or `None` without an editor.
    fn editor_size(&mut self) -> Option<(u32, u32)> {
        None
    }

    /// Embed the editor in the native window `parent`.
    fn open_editor(&mut self, _parent: *mut c_void) {}

    fn close_editor(&mut self) {}

    fn is_editor_open(&self) -> bool {
        false
    }

    fn editor_idle(&mut self) {}

    /// Destroy the instance.
    fn close(self: Box<Self>) {}
}
