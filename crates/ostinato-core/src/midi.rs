//! MIDI block timing: device queue drain, timestamp to sample offset, deltas.
//!
//! A device queue hands out messages stamped in milliseconds relative to the
//! device's own reference instant. [`MidiEventAdapter`] turns them into
//! [`BlockMidiEvent`]s with sample offsets inside the current block.

/// Default scratch capacity for one drain call.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

/// A message as drained from a device queue.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawMidiMessage {
    /// Status and data bytes, zero padded.
    pub data: [u8; 4],
    /// Milliseconds since the queue's reference instant.
    pub rel_time_ms: f64,
}

impl RawMidiMessage {
    /// Build from 1..=4 raw bytes. Longer messages (SysEx) return `None`.
    pub fn from_bytes(bytes: &[u8], rel_time_ms: f64) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 4 {
            return None;
        }
        let mut data = [0u8; 4];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(Self { data, rel_time_ms })
    }
}

/// A MIDI event positioned inside the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockMidiEvent {
    pub data: [u8; 4],
    /// Sample offset, always `< block length`.
    pub offset: usize,
}

/// Non-blocking source of device MIDI messages.
///
/// Implementors must not block or allocate: `drain` runs on the audio thread.
/// A device's reference instant only advances when a drain returns fewer
/// messages than `out` can hold.
pub trait MidiInputQueue: Send {
    /// Move pending messages into `out`, returning how many were written.
    fn drain(&mut self, out: &mut [RawMidiMessage]) -> usize;

    /// Restart relative timing at "now". Called when the stream starts.
    fn reset_timing(&mut self) {}
}

/// Convert a device-relative timestamp to an offset inside a block of
/// `block_len` samples. Late events clamp to the last sample.
#[inline]
pub fn sample_offset(rel_time_ms: f64, sample_rate: f64, block_len: usize) -> usize {
    if block_len == 0 {
        return 0;
    }
    // Negative and NaN saturate to 0
    let raw = (rel_time_ms * sample_rate / 1000.0).floor() as usize;
    raw.min(block_len - 1)
}

/// Pair each event with its distance in samples from the previous event.
/// The first delta is the first event's offset.
pub fn with_deltas(events: &[BlockMidiEvent]) -> impl Iterator<Item = (i32, [u8; 4])> + '_ {
    let mut previous = 0usize;
    events.iter().map(move |event| {
        let delta = event.offset as i64 - previous as i64;
        previous = event.offset;
        (delta as i32, event.data)
    })
}

/// Per-block MIDI collector with fixed scratch storage.
pub struct MidiEventAdapter {
    scratch: Box<[RawMidiMessage]>,
    events: Vec<BlockMidiEvent>,
    dropped: u64,
}

impl MidiEventAdapter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            scratch: vec![RawMidiMessage::default(); capacity].into_boxed_slice(),
            events: Vec::with_capacity(capacity),
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.scratch.len()
    }

    /// Messages drained after the first batch of a block and discarded.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drain `queue` and return this block's events.
    ///
    /// Drains repeat while the queue fills the scratch buffer so the device
    /// clock resets once per block. Only the first batch becomes events;
    /// the rest are counted in [`dropped`](Self::dropped).
    pub fn collect(
        &mut self,
        queue: &mut dyn MidiInputQueue,
        block_len: usize,
        sample_rate: f64,
    ) -> &[BlockMidiEvent] {
        self.events.clear();
        let capacity = self.scratch.len();
        let mut first_batch = true;

        loop {
            let count = queue.drain(&mut self.scratch).min(capacity);
            if first_batch {
                self.events
                    .extend(self.scratch[..count].iter().map(|message| BlockMidiEvent {
                        data: message.data,
                        offset: sample_offset(message.rel_time_ms, sample_rate, block_len),
                    }));
                first_batch = false;
            } else {
                self.dropped += count as u64;
            }
            if count < capacity {
                break;
            }
        }

        &self.events
    }
}
