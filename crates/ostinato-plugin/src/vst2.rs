//! In-process VST2 plugin.

use crate::abi::{self, AEffect, ERect, PluginMain};
use crate::error::{BridgeError, LoadStage, Result};
use crate::events::PluginEventBatch;
use crate::host::{host_callback, with_loading_context, HostContext, HostEventHandler, HostIdentity};
use libloading::Library;
use ostinato_core::{BlockMidiEvent, ChannelBufferSet, ChunkKind, PluginBridge, PluginProperties};
use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Longest name buffer handed to the plugin. The protocol limits are
/// smaller, but plugins routinely overrun them.
const NAME_BUFFER_LEN: usize = 256;

/// A loaded VST2 effect.
///
/// Dropping it closes the effect exactly once and then unloads the library.
pub struct Vst2Plugin {
    effect: *mut AEffect,
    path: PathBuf,
    is_instrument: bool,
    editor_open: bool,
    events: PluginEventBatch,
    input_ptrs: Vec<*mut f32>,
    output_ptrs: Vec<*mut f32>,
    context: Arc<HostContext>,
    /// Dropped last, after the effect is closed.
    #[allow(dead_code)]
    library: Option<Library>,
}

// SAFETY: the effect is only used through `&mut self`; the host never calls
// it from two threads at once.
unsafe impl Send for Vst2Plugin {}

impl Vst2Plugin {
    /// Load the plugin binary at `path`.
    pub fn load(
        path: &Path,
        identity: HostIdentity,
        handler: Arc<dyn HostEventHandler>,
    ) -> Result<Self> {
        let fail = |stage, reason: String| {
            error!(path = %path.display(), %stage, %reason, "plugin load failed");
            BridgeError::LoadFailed {
                path: path.to_path_buf(),
                stage,
                reason,
            }
        };

        // SAFETY: loading runs the library's initializers; we trust the
        // plugin binary the user pointed at.
        let library = unsafe { Library::new(path) }
            .map_err(|e| fail(LoadStage::Opening, e.to_string()))?;

        // SAFETY: the symbol is the VST2 entry point with the `PluginMain`
        // signature.
        let main: PluginMain = abi::ENTRY_POINTS
            .iter()
            .find_map(|name| unsafe { library.get::<PluginMain>(*name).ok().map(|symbol| *symbol) })
            .ok_or_else(|| fail(LoadStage::EntryPoint, "no VSTPluginMain or main symbol".into()))?;

        let context = Arc::new(HostContext::new(identity, handler));
        // SAFETY: `main` came from the library, which is still loaded
        let effect = with_loading_context(Arc::clone(&context), || unsafe { main(host_callback) });
        if effect.is_null() {
            return Err(fail(LoadStage::Instantiation, "entry point returned null".into()));
        }

        // SAFETY: non-null effect returned by the entry point
        unsafe { Self::from_raw(effect, context, Some(library), path.to_path_buf()) }
    }

    /// Wrap an effect created by an entry point.
    ///
    /// Checks the magic value, binds `context` to the effect and negotiates
    /// MIDI input.
    ///
    /// # Safety
    ///
    /// `effect` must point to a live `AEffect` that stays valid until it
    /// receives the close opcode, and `library` (if any) must be the
    /// library its code lives in.
    pub unsafe fn from_raw(
        effect: *mut AEffect,
        context: Arc<HostContext>,
        library: Option<Library>,
        path: PathBuf,
    ) -> Result<Self> {
        if (*effect).magic != abi::EFFECT_MAGIC {
            let reason = format!("magic {:#010x}, expected 'VstP'", (*effect).magic);
            error!(path = %path.display(), %reason, "plugin load failed");
            return Err(BridgeError::LoadFailed {
                path,
                stage: LoadStage::Identity,
                reason,
            });
        }

        (*effect).reserved1 = Arc::as_ptr(&context) as isize;

        let num_inputs = (*effect).num_inputs.max(0) as usize;
        let num_outputs = (*effect).num_outputs.max(0) as usize;

        let mut plugin = Self {
            effect,
            path,
            is_instrument: false,
            editor_open: false,
            events: PluginEventBatch::new(),
            input_ptrs: Vec::with_capacity(num_inputs),
            output_ptrs: Vec::with_capacity(num_outputs),
            context,
            library,
        };

        let can_receive_midi = plugin.dispatch(
            abi::effect::CAN_DO,
            0,
            0,
            abi::CAN_DO_RECEIVE_MIDI.as_ptr() as *mut c_void,
            0.0,
        );
        plugin.is_instrument = can_receive_midi == 1;

        let name = plugin.name();
        info!(
            path = %plugin.path.display(),
            %name,
            inputs = num_inputs,
            outputs = num_outputs,
            instrument = plugin.is_instrument,
            "loaded VST2 plugin"
        );
        Ok(plugin)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn host_identity(&self) -> &HostIdentity {
        self.context.identity()
    }

    fn dispatch(&mut self, opcode: i32, index: i32, value: isize, ptr: *mut c_void, opt: f32) -> isize {
        // SAFETY: `effect` is valid until Drop
        unsafe {
            match (*self.effect).dispatcher {
                Some(dispatcher) => dispatcher(self.effect, opcode, index, value, ptr, opt),
                None => 0,
            }
        }
    }

    fn read_string(&mut self, opcode: i32, index: i32) -> String {
        let mut buffer = [0u8; NAME_BUFFER_LEN];
        self.dispatch(opcode, index, 0, buffer.as_mut_ptr() as *mut c_void, 0.0);
        // Force termination in case the plugin filled the whole buffer
        buffer[NAME_BUFFER_LEN - 1] = 0;
        CStr::from_bytes_until_nul(&buffer)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Plugin's self-reported name.
    pub fn name(&mut self) -> String {
        self.read_string(abi::effect::GET_EFFECT_NAME, 0)
    }

    pub fn parameter_name(&mut self, index: usize) -> String {
        self.read_string(abi::effect::GET_PARAM_NAME, index as i32)
    }

    pub fn set_program(&mut self, program: i32) {
        self.dispatch(abi::effect::SET_PROGRAM, 0, program as isize, ptr::null_mut(), 0.0);
    }

    pub fn program(&mut self) -> i32 {
        self.dispatch(abi::effect::GET_PROGRAM, 0, 0, ptr::null_mut(), 0.0) as i32
    }
}

impl PluginBridge for Vst2Plugin {
    fn open(&mut self) {
        self.dispatch(abi::effect::OPEN, 0, 0, ptr::null_mut(), 0.0);
        debug!(path = %self.path.display(), "plugin opened");
    }

    fn set_sample_rate(&mut self, rate: f32) {
        self.context.set_sample_rate(rate);
        self.dispatch(abi::effect::SET_SAMPLE_RATE, 0, 0, ptr::null_mut(), rate);
    }

    fn set_block_size(&mut self, frames: usize) {
        self.context.set_block_size(frames);
        self.dispatch(abi::effect::SET_BLOCK_SIZE, 0, frames as isize, ptr::null_mut(), 0.0);
    }

    fn resume(&mut self) {
        self.dispatch(abi::effect::MAINS_CHANGED, 0, 1, ptr::null_mut(), 0.0);
        debug!("plugin resumed");
    }

    fn suspend(&mut self) {
        self.dispatch(abi::effect::MAINS_CHANGED, 0, 0, ptr::null_mut(), 0.0);
        debug!("plugin suspended");
    }

    fn properties(&self) -> PluginProperties {
        // SAFETY: `effect` is valid until Drop
        let effect = unsafe { &*self.effect };
        PluginProperties {
            num_inputs: effect.num_inputs.max(0) as usize,
            num_outputs: effect.num_outputs.max(0) as usize,
            is_instrument: self.is_instrument,
        }
    }

    fn process_block(
        &mut self,
        inputs: &mut ChannelBufferSet,
        outputs: &mut ChannelBufferSet,
        frames: usize,
    ) {
        // SAFETY: `effect` is valid until Drop
        let effect = unsafe { &*self.effect };
        let num_inputs = effect.num_inputs.max(0) as usize;
        let num_outputs = effect.num_outputs.max(0) as usize;
        let Some(process) = effect.process_replacing else {
            outputs.clear();
            return;
        };
        if inputs.num_channels() < num_inputs || outputs.num_channels() < num_outputs {
            outputs.clear();
            return;
        }
        let frames = frames.min(inputs.frames()).min(outputs.frames());

        // Both vectors were sized for the plugin's channel counts
        self.input_ptrs.clear();
        self.input_ptrs
            .extend(inputs.iter_mut().take(num_inputs).map(|c| c.as_mut_ptr()));
        self.output_ptrs.clear();
        self.output_ptrs
            .extend(outputs.iter_mut().take(num_outputs).map(|c| c.as_mut_ptr()));

        // SAFETY: pointer arrays hold `num_inputs` / `num_outputs` channels
        // of at least `frames` samples each.
        unsafe {
            process(
                self.effect,
                self.input_ptrs.as_mut_ptr(),
                self.output_ptrs.as_mut_ptr(),
                frames as i32,
            );
        }
    }

    fn set_block_events(&mut self, events: &[BlockMidiEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }
        let count = self.events.fill(events);
        let list = self.events.as_ptr();
        self.dispatch(abi::effect::PROCESS_EVENTS, 0, 0, list, 0.0);
        count
    }

    fn parameter_count(&self) -> usize {
        // SAFETY: `effect` is valid until Drop
        unsafe { (*self.effect).num_params.max(0) as usize }
    }

    fn parameter(&self, index: usize) -> f32 {
        // SAFETY: `effect` is valid until Drop
        unsafe {
            match (*self.effect).get_parameter {
                Some(get) => get(self.effect, index as i32),
                None => 0.0,
            }
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        // SAFETY: `effect` is valid until Drop
        unsafe {
            if let Some(set) = (*self.effect).set_parameter {
                set(self.effect, index as i32, value);
            }
        }
    }

    fn chunk(&mut self, kind: ChunkKind) -> Vec<u8> {
        let mut data: *mut c_void = ptr::null_mut();
        let len = self.dispatch(
            abi::effect::GET_CHUNK,
            chunk_index(kind),
            0,
            &mut data as *mut *mut c_void as *mut c_void,
            0.0,
        );
        if len <= 0 || data.is_null() {
            return Vec::new();
        }
        // SAFETY: the plugin owns `len` bytes at `data` until its next call
        unsafe { std::slice::from_raw_parts(data as *const u8, len as usize).to_vec() }
    }

    fn set_chunk(&mut self, kind: ChunkKind, data: &[u8]) {
        self.dispatch(
            abi::effect::SET_CHUNK,
            chunk_index(kind),
            data.len() as isize,
            data.as_ptr() as *mut c_void,
            0.0,
        );
    }

    fn editor_size(&mut self) -> Option<(u32, u32)> {
        let mut rect: *mut ERect = ptr::null_mut();
        self.dispatch(
            abi::effect::EDIT_GET_RECT,
            0,
            0,
            &mut rect as *mut *mut ERect as *mut c_void,
            0.0,
        );
        // SAFETY: a non-null rect stays valid until the next dispatch
        let rect = unsafe { rect.as_ref() }?;
        let width = (rect.right as i32 - rect.left as i32).max(0) as u32;
        let height = (rect.bottom as i32 - rect.top as i32).max(0) as u32;
        Some((width, height))
    }

    fn open_editor(&mut self, parent: *mut c_void) {
        if self.editor_open {
            return;
        }
        self.dispatch(abi::effect::EDIT_OPEN, 0, 0, parent, 0.0);
        self.editor_open = true;
        debug!("plugin editor opened");
    }

    fn close_editor(&mut self) {
        if !self.editor_open {
            return;
        }
        self.dispatch(abi::effect::EDIT_CLOSE, 0, 0, ptr::null_mut(), 0.0);
        self.editor_open = false;
        debug!("plugin editor closed");
    }

    fn is_editor_open(&self) -> bool {
        self.editor_open
    }

    fn editor_idle(&mut self) {
        if self.editor_open {
            self.dispatch(abi::effect::EDIT_IDLE, 0, 0, ptr::null_mut(), 0.0);
        }
    }
}

fn chunk_index(kind: ChunkKind) -> i32 {
    match kind {
        ChunkKind::Bank => 0,
        ChunkKind::Program => 1,
    }
}

impl Drop for Vst2Plugin {
    fn drop(&mut self) {
        self.close_editor();
        self.dispatch(abi::effect::CLOSE, 0, 0, ptr::null_mut(), 0.0);
        info!(path = %self.path.display(), "plugin closed");
        // `library` unloads when the fields drop
    }
}
