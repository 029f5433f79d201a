//! Pre-allocated VST2 event batch.
//!
//! Records and the pointer list are built once; per block only delta and
//! payload bytes are written.

use ostinato_core::midi::{with_deltas, BlockMidiEvent};
use std::ffi::c_void;
use std::{mem, ptr};
use vst::api;

/// Events delivered per block; the rest are dropped.
pub const MAX_BLOCK_EVENTS: usize = 4096;

/// `VstEvents` with a fixed-size pointer array in place of the C flexible
/// array member.
#[repr(C)]
struct EventList {
    num_events: i32,
    _reserved: isize,
    events: [*mut api::Event; MAX_BLOCK_EVENTS],
}

pub struct PluginEventBatch {
    /// Backing storage for `list.events`. Written only through those pointers.
    _records: Box<[api::MidiEvent]>,
    list: Box<EventList>,
}

// SAFETY: the raw pointers only reference `_records`, which the batch owns
// and never exposes.
unsafe impl Send for PluginEventBatch {}

impl PluginEventBatch {
    pub fn new() -> Self {
        let records: Box<[api::MidiEvent]> = (0..MAX_BLOCK_EVENTS).map(|_| blank_record()).collect();
        let list = Box::new(EventList {
            num_events: 0,
            _reserved: 0,
            events: [ptr::null_mut(); MAX_BLOCK_EVENTS],
        });
        let mut batch = Self {
            _records: records,
            list,
        };
        // Pointers are taken from the records at their final place.
        let base = batch._records.as_mut_ptr();
        for (i, slot) in batch.list.events.iter_mut().enumerate() {
            // SAFETY: `i < MAX_BLOCK_EVENTS == _records.len()`
            *slot = unsafe { base.add(i) } as *mut api::Event;
        }
        batch
    }

    /// Write `events` as delta-timed records, truncating at capacity.
    /// Returns the number of records now in the batch.
    pub fn fill(&mut self, events: &[BlockMidiEvent]) -> usize {
        let count = events.len().min(MAX_BLOCK_EVENTS);
        for (slot, (delta, data)) in self.list.events.iter().zip(with_deltas(&events[..count])) {
            // SAFETY: every slot points at a distinct record in `_records`.
            let record = unsafe { &mut *(*slot as *mut api::MidiEvent) };
            record.delta_frames = delta;
            record.midi_data = [data[0], data[1], data[2]];
            record._midi_reserved = data[3];
        }
        self.list.num_events = count as i32;
        count
    }

    pub fn len(&self) -> usize {
        self.list.num_events as usize
    }

    pub fn is_empty(&self) -> bool {
        self.list.num_events == 0
    }

    /// Pointer handed to the plugin's process-events opcode.
    pub fn as_ptr(&mut self) -> *mut c_void {
        &mut *self.list as *mut EventList as *mut c_void
    }

    /// Record `index` of the current batch.
    pub fn get(&self, index: usize) -> Option<&api::MidiEvent> {
        if index >= self.len() {
            return None;
        }
        // SAFETY: as in `fill`
        Some(unsafe { &*(self.list.events[index] as *const api::MidiEvent) })
    }
}

impl Default for PluginEventBatch {
    fn default() -> Self {
        Self::new()
    }
}

fn blank_record() -> api::MidiEvent {
    api::MidiEvent {
        event_type: api::EventType::Midi,
        byte_size: mem::size_of::<api::MidiEvent>() as i32,
        delta_frames: 0,
        flags: api::MidiEventFlags::REALTIME_EVENT.bits(),
        note_length: 0,
        note_offset: 0,
        midi_data: [0; 3],
        _midi_reserved: 0,
        detune: 0,
        note_off_velocity: 0,
        _reserved1: 0,
        _reserved2: 0,
    }
}
