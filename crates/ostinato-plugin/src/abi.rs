//! VST 2.4 binary interface: the effect descriptor, opcodes and constants.

use std::ffi::c_void;

/// `'VstP'`, the first field of every valid effect.
pub const EFFECT_MAGIC: i32 = i32::from_be_bytes(*b"VstP");

/// Host version answered to the plugin.
pub const VST_VERSION: isize = 2400;

/// `kVstProcessLevelRealtime`
pub const PROCESS_LEVEL_REALTIME: isize = 2;

/// Longest vendor or product string a plugin accepts, NUL included.
pub const MAX_VENDOR_STR_LEN: usize = 64;

/// Can-do string a plugin answers to when it consumes MIDI.
pub const CAN_DO_RECEIVE_MIDI: &[u8] = b"receiveVstMidiEvent\0";

/// Entry points in lookup order.
pub const ENTRY_POINTS: [&[u8]; 2] = [b"VSTPluginMain\0", b"main\0"];

pub type HostCallbackProc =
    extern "C" fn(*mut AEffect, i32, i32, isize, *mut c_void, f32) -> isize;
pub type DispatcherProc =
    unsafe extern "C" fn(*mut AEffect, i32, i32, isize, *mut c_void, f32) -> isize;
pub type ProcessProc = unsafe extern "C" fn(*mut AEffect, *mut *mut f32, *mut *mut f32, i32);
pub type ProcessDoubleProc =
    unsafe extern "C" fn(*mut AEffect, *mut *mut f64, *mut *mut f64, i32);
pub type SetParameterProc = unsafe extern "C" fn(*mut AEffect, i32, f32);
pub type GetParameterProc = unsafe extern "C" fn(*mut AEffect, i32) -> f32;
pub type PluginMain = unsafe extern "C" fn(HostCallbackProc) -> *mut AEffect;

/// Effect descriptor shared with the plugin.
#[repr(C)]
pub struct AEffect {
    pub magic: i32,
    pub dispatcher: Option<DispatcherProc>,
    pub process: Option<ProcessProc>,
    pub set_parameter: Option<SetParameterProc>,
    pub get_parameter: Option<GetParameterProc>,
    pub num_programs: i32,
    pub num_params: i32,
    pub num_inputs: i32,
    pub num_outputs: i32,
    pub flags: i32,
    /// Reserved for the host; holds the host context of this instance.
    pub reserved1: isize,
    pub reserved2: isize,
    pub initial_delay: i32,
    pub real_qualities: i32,
    pub off_qualities: i32,
    pub io_ratio: f32,
    pub object: *mut c_void,
    pub user: *mut c_void,
    pub unique_id: i32,
    pub version: i32,
    pub process_replacing: Option<ProcessProc>,
    pub process_double_replacing: Option<ProcessDoubleProc>,
    pub future: [u8; 56],
}

/// Editor rectangle.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ERect {
    pub top: i16,
    pub left: i16,
    pub bottom: i16,
    pub right: i16,
}

/// Host to plugin opcodes.
pub mod effect {
    pub const OPEN: i32 = 0;
    pub const CLOSE: i32 = 1;
    pub const SET_PROGRAM: i32 = 2;
    pub const GET_PROGRAM: i32 = 3;
    pub const GET_PARAM_NAME: i32 = 8;
    pub const SET_SAMPLE_RATE: i32 = 10;
    pub const SET_BLOCK_SIZE: i32 = 11;
    pub const MAINS_CHANGED: i32 = 12;
    pub const EDIT_GET_RECT: i32 = 13;
    pub const EDIT_OPEN: i32 = 14;
    pub const EDIT_CLOSE: i32 = 15;
    pub const EDIT_IDLE: i32 = 19;
    pub const GET_CHUNK: i32 = 23;
    pub const SET_CHUNK: i32 = 24;
    pub const PROCESS_EVENTS: i32 = 25;
    pub const GET_EFFECT_NAME: i32 = 45;
    pub const CAN_DO: i32 = 51;
}

/// Plugin to host opcodes.
pub mod host {
    pub const AUTOMATE: i32 = 0;
    pub const VERSION: i32 = 1;
    pub const CURRENT_ID: i32 = 2;
    pub const IDLE: i32 = 3;
    pub const WANT_MIDI: i32 = 6;
    pub const GET_TIME: i32 = 7;
    pub const PROCESS_EVENTS: i32 = 8;
    pub const IO_CHANGED: i32 = 13;
    pub const SIZE_WINDOW: i32 = 15;
    pub const GET_SAMPLE_RATE: i32 = 16;
    pub const GET_BLOCK_SIZE: i32 = 17;
    pub const GET_CURRENT_PROCESS_LEVEL: i32 = 23;
    pub const GET_VENDOR_STRING: i32 = 32;
    pub const GET_PRODUCT_STRING: i32 = 33;
    pub const GET_VENDOR_VERSION: i32 = 34;
    pub const CAN_DO: i32 = 37;
    pub const UPDATE_DISPLAY: i32 = 42;
    pub const BEGIN_EDIT: i32 = 43;
    pub const END_EDIT: i32 = 44;
}
