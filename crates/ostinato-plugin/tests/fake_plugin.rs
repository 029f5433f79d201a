//! Vst2Plugin against an in-process fake effect.

use ostinato_core::{BlockMidiEvent, ChannelBufferSet, ChunkKind, PluginBridge};
use ostinato_plugin::abi::{self, AEffect, ERect};
use ostinato_plugin::{
    load_program, save_program, BridgeError, HostContext, HostIdentity, IgnoreNotifications,
    LoadStage, Vst2Plugin, MAX_BLOCK_EVENTS,
};
use std::ffi::{c_char, c_void, CStr};
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Fake effect
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    opcodes: Vec<(i32, isize, f32)>,
    /// (delta, status, data1) of every delivered event
    events: Vec<(i32, u8, u8)>,
    chunk: Vec<u8>,
    rect: Option<ERect>,
    receives_midi: bool,
    gain: f32,
    params: [f32; 4],
}

impl FakeState {
    fn count(&self, opcode: i32) -> usize {
        self.opcodes.iter().filter(|(op, _, _)| *op == opcode).count()
    }
}

unsafe fn state<'a>(effect: *mut AEffect) -> &'a mut FakeState {
    &mut *((*effect).object as *mut FakeState)
}

unsafe extern "C" fn dispatcher(
    effect: *mut AEffect,
    opcode: i32,
    _index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    let state = state(effect);
    state.opcodes.push((opcode, value, opt));
    match opcode {
        abi::effect::CAN_DO => {
            let query = CStr::from_ptr(ptr as *const c_char);
            (state.receives_midi && query.to_bytes() == b"receiveVstMidiEvent") as isize
        }
        abi::effect::PROCESS_EVENTS => {
            let list = &*(ptr as *const vst::api::Events);
            let first = list.events.as_ptr();
            for i in 0..list.num_events as usize {
                let event = &*(*first.add(i) as *const vst::api::MidiEvent);
                state
                    .events
                    .push((event.delta_frames, event.midi_data[0], event.midi_data[1]));
            }
            1
        }
        abi::effect::GET_CHUNK => {
            *(ptr as *mut *mut c_void) = state.chunk.as_mut_ptr() as *mut c_void;
            state.chunk.len() as isize
        }
        abi::effect::SET_CHUNK => {
            state.chunk = std::slice::from_raw_parts(ptr as *const u8, value as usize).to_vec();
            1
        }
        abi::effect::EDIT_GET_RECT => match state.rect.as_mut() {
            Some(rect) => {
                *(ptr as *mut *mut ERect) = rect as *mut ERect;
                1
            }
            None => 0,
        },
        abi::effect::GET_EFFECT_NAME => {
            let name = b"Fake Synth\0";
            ptr::copy_nonoverlapping(name.as_ptr(), ptr as *mut u8, name.len());
            1
        }
        _ => 0,
    }
}

unsafe extern "C" fn process_replacing(
    effect: *mut AEffect,
    inputs: *mut *mut f32,
    outputs: *mut *mut f32,
    frames: i32,
) {
    let gain = state(effect).gain;
    let input = *inputs;
    for channel in 0..(*effect).num_outputs as usize {
        let output = *outputs.add(channel);
        for i in 0..frames as usize {
            *output.add(i) = *input.add(i) * gain;
        }
    }
}

unsafe extern "C" fn set_parameter(effect: *mut AEffect, index: i32, value: f32) {
    state(effect).params[index as usize] = value;
}

unsafe extern "C" fn get_parameter(effect: *mut AEffect, index: i32) -> f32 {
    state(effect).params[index as usize]
}

/// Effect and its state, kept alive for the whole test.
struct Fake {
    effect: Box<AEffect>,
    state: Box<FakeState>,
}

impl Fake {
    fn new(state: FakeState) -> Self {
        let mut state = Box::new(state);
        let effect = Box::new(AEffect {
            magic: abi::EFFECT_MAGIC,
            dispatcher: Some(dispatcher),
            process: None,
            set_parameter: Some(set_parameter),
            get_parameter: Some(get_parameter),
            num_programs: 1,
            num_params: 4,
            num_inputs: 1,
            num_outputs: 2,
            flags: 0,
            reserved1: 0,
            reserved2: 0,
            initial_delay: 0,
            real_qualities: 0,
            off_qualities: 0,
            io_ratio: 1.0,
            object: &mut *state as *mut FakeState as *mut c_void,
            user: ptr::null_mut(),
            unique_id: 0x4661_6B65,
            version: 1,
            process_replacing: Some(process_replacing),
            process_double_replacing: None,
            future: [0; 56],
        });
        Self { effect, state }
    }

    fn plugin(&mut self) -> Result<Vst2Plugin, BridgeError> {
        let context = Arc::new(HostContext::new(
            HostIdentity::default(),
            Arc::new(IgnoreNotifications),
        ));
        // SAFETY: the effect outlives the plugin in every test
        unsafe {
            Vst2Plugin::from_raw(
                &mut *self.effect as *mut AEffect,
                context,
                None,
                PathBuf::from("fake.so"),
            )
        }
    }
}

fn synth() -> Fake {
    Fake::new(FakeState {
        receives_midi: true,
        gain: 2.0,
        ..FakeState::default()
    })
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn test_bad_magic_rejected_without_dispatch() {
    let mut fake = synth();
    fake.effect.magic = 0x1234;
    match fake.plugin() {
        Err(BridgeError::LoadFailed { stage, .. }) => assert_eq!(stage, LoadStage::Identity),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bad magic accepted"),
    }
    assert!(fake.state.opcodes.is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_library_without_entry_point_rejected() {
    let result = Vst2Plugin::load(
        std::path::Path::new("libm.so.6"),
        HostIdentity::default(),
        Arc::new(IgnoreNotifications),
    );
    match result {
        Err(BridgeError::LoadFailed { stage, path, .. }) => {
            assert_eq!(stage, LoadStage::EntryPoint);
            assert_eq!(path, PathBuf::from("libm.so.6"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("libm accepted as a plugin"),
    }
}

#[test]
fn test_missing_library_rejected_at_opening() {
    let dir = tempfile::tempdir().unwrap();
    let result = Vst2Plugin::load(
        &dir.path().join("absent.so"),
        HostIdentity::default(),
        Arc::new(IgnoreNotifications),
    );
    assert!(matches!(
        result,
        Err(BridgeError::LoadFailed { stage: LoadStage::Opening, .. })
    ));
}

#[test]
fn test_midi_capability_negotiated_once() {
    let mut fake = synth();
    let plugin = fake.plugin().unwrap();
    let properties = plugin.properties();
    assert!(properties.is_instrument);
    assert_eq!(properties.num_inputs, 1);
    assert_eq!(properties.num_outputs, 2);

    let _ = plugin.properties();
    drop(plugin);
    assert_eq!(fake.state.count(abi::effect::CAN_DO), 1);
    assert_ne!(fake.effect.reserved1, 0);
}

#[test]
fn test_effect_without_midi_is_not_instrument() {
    let mut fake = Fake::new(FakeState::default());
    let plugin = fake.plugin().unwrap();
    assert!(!plugin.properties().is_instrument);
}

#[test]
fn test_name_read_from_plugin() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    assert_eq!(plugin.name(), "Fake Synth");
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_setup_opcodes() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    plugin.open();
    plugin.set_sample_rate(48000.0);
    plugin.set_block_size(256);
    plugin.resume();
    plugin.suspend();
    drop(plugin);

    let calls: Vec<_> = fake
        .state
        .opcodes
        .iter()
        .filter(|(op, _, _)| ![abi::effect::CAN_DO, abi::effect::GET_EFFECT_NAME].contains(op))
        .copied()
        .collect();
    assert_eq!(
        calls,
        vec![
            (abi::effect::OPEN, 0, 0.0),
            (abi::effect::SET_SAMPLE_RATE, 0, 48000.0),
            (abi::effect::SET_BLOCK_SIZE, 256, 0.0),
            (abi::effect::MAINS_CHANGED, 1, 0.0),
            (abi::effect::MAINS_CHANGED, 0, 0.0),
            (abi::effect::CLOSE, 0, 0.0),
        ]
    );
}

#[test]
fn test_drop_closes_exactly_once() {
    let mut fake = synth();
    let plugin = fake.plugin().unwrap();
    Box::new(plugin).close();
    assert_eq!(fake.state.count(abi::effect::CLOSE), 1);
}

// ---------------------------------------------------------------------------
// Events and audio
// ---------------------------------------------------------------------------

#[test]
fn test_block_events_delivered_as_deltas() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    let events = [
        BlockMidiEvent { data: [0x90, 60, 100, 0], offset: 240 },
        BlockMidiEvent { data: [0x80, 60, 0, 0], offset: 250 },
    ];
    assert_eq!(plugin.set_block_events(&events), 2);
    drop(plugin);
    assert_eq!(fake.state.events, vec![(240, 0x90, 60), (10, 0x80, 60)]);
}

#[test]
fn test_empty_batch_not_dispatched() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    assert_eq!(plugin.set_block_events(&[]), 0);
    drop(plugin);
    assert_eq!(fake.state.count(abi::effect::PROCESS_EVENTS), 0);
}

#[test]
fn test_oversized_batch_truncated() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    let events = vec![BlockMidiEvent { data: [0xF8, 0, 0, 0], offset: 0 }; MAX_BLOCK_EVENTS + 100];
    assert_eq!(plugin.set_block_events(&events), MAX_BLOCK_EVENTS);
    drop(plugin);
    assert_eq!(fake.state.events.len(), MAX_BLOCK_EVENTS);
}

#[test]
fn test_process_block_through_pointer_arrays() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    let mut inputs = ChannelBufferSet::new(1, 8);
    let mut outputs = ChannelBufferSet::new(2, 8);
    inputs.channel_mut(0).fill(0.25);

    plugin.process_block(&mut inputs, &mut outputs, 8);
    assert_eq!(outputs.channel(0), &[0.5; 8]);
    assert_eq!(outputs.channel(1), &[0.5; 8]);
}

#[test]
fn test_process_block_with_too_few_buffers_outputs_silence() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    let mut inputs = ChannelBufferSet::new(0, 8);
    let mut outputs = ChannelBufferSet::new(2, 8);
    outputs.channel_mut(0).fill(1.0);

    plugin.process_block(&mut inputs, &mut outputs, 8);
    assert_eq!(outputs.channel(0), &[0.0; 8]);
}

// ---------------------------------------------------------------------------
// Parameters, state, editor
// ---------------------------------------------------------------------------

#[test]
fn test_parameters() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    assert_eq!(plugin.parameter_count(), 4);
    plugin.set_parameter(2, 0.3);
    assert_eq!(plugin.parameter(2), 0.3);
}

#[test]
fn test_preset_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patch.preset");

    let mut fake = synth();
    fake.state.chunk = vec![9, 8, 7, 6];
    let mut plugin = fake.plugin().unwrap();
    assert_eq!(save_program(&mut plugin, &path).unwrap(), 4);

    plugin.set_chunk(ChunkKind::Program, &[0]);
    assert_eq!(plugin.chunk(ChunkKind::Program), vec![0]);

    assert_eq!(load_program(&mut plugin, &path).unwrap(), 4);
    assert_eq!(plugin.chunk(ChunkKind::Program), vec![9, 8, 7, 6]);

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(&on_disk[..4], b"X3VX");
}

#[test]
fn test_save_empty_chunk_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    let err = save_program(&mut plugin, &dir.path().join("empty.preset")).unwrap_err();
    assert!(matches!(err, BridgeError::StateSaveError(_)));
}

#[test]
fn test_editor_size_none_without_rect() {
    let mut fake = synth();
    let mut plugin = fake.plugin().unwrap();
    assert_eq!(plugin.editor_size(), None);
}

#[test]
fn test_editor_open_close_idempotent() {
    let mut fake = synth();
    fake.state.rect = Some(ERect { top: 10, left: 20, bottom: 310, right: 420 });
    let mut plugin = fake.plugin().unwrap();

    assert_eq!(plugin.editor_size(), Some((400, 300)));

    plugin.open_editor(ptr::null_mut());
    plugin.open_editor(ptr::null_mut());
    assert!(plugin.is_editor_open());
    plugin.editor_idle();
    plugin.close_editor();
    plugin.close_editor();
    assert!(!plugin.is_editor_open());
    plugin.editor_idle();

    plugin.open_editor(ptr::null_mut());
    drop(plugin);

    assert_eq!(fake.state.count(abi::effect::EDIT_OPEN), 2);
    assert_eq!(fake.state.count(abi::effect::EDIT_CLOSE), 2);
    assert_eq!(fake.state.count(abi::effect::EDIT_IDLE), 1);
}
