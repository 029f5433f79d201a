//! SPSC queue between the MIDI backend thread and the audio thread.

use ostinato_core::midi::{MidiInputQueue, RawMidiMessage};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::time::Instant;

type Stamped = (Instant, [u8; 4]);

/// Create a queue holding up to `capacity` messages.
pub fn input_queue(capacity: usize) -> (MidiInputProducer, MidiInputReader) {
    let (producer, consumer) = HeapRb::<Stamped>::new(capacity.max(1)).split();
    (
        MidiInputProducer { producer, dropped: 0 },
        MidiInputReader {
            consumer,
            reference: Instant::now(),
        },
    )
}

/// Producer half, owned by the MIDI backend callback.
pub struct MidiInputProducer {
    producer: HeapProd<Stamped>,
    dropped: u64,
}

impl MidiInputProducer {
    /// Queue a message that arrived at `stamp`.
    ///
    /// Returns `false` when the message is dropped: empty, longer than four
    /// bytes (SysEx), or the queue is full.
    pub fn push(&mut self, bytes: &[u8], stamp: Instant) -> bool {
        if bytes.is_empty() || bytes.len() > 4 {
            self.dropped += 1;
            return false;
        }
        let mut data = [0u8; 4];
        data[..bytes.len()].copy_from_slice(bytes);
        if self.producer.try_push((stamp, data)).is_err() {
            self.dropped += 1;
            return false;
        }
        true
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Consumer half, owned by the block processor.
///
/// Timestamps are milliseconds since the reader's reference instant. The
/// reference moves to "now" whenever a drain comes back short, which is once
/// per block in normal operation.
pub struct MidiInputReader {
    consumer: HeapCons<Stamped>,
    reference: Instant,
}

impl MidiInputReader {
    /// Drain with an explicit clock.
    pub fn drain_at(&mut self, out: &mut [RawMidiMessage], now: Instant) -> usize {
        let mut count = 0;
        for slot in out.iter_mut() {
            let Some((stamp, data)) = self.consumer.try_pop() else {
                break;
            };
            let elapsed = stamp.saturating_duration_since(self.reference);
            *slot = RawMidiMessage {
                data,
                rel_time_ms: elapsed.as_secs_f64() * 1000.0,
            };
            count += 1;
        }
        if count < out.len() {
            self.reference = now;
        }
        count
    }

    pub fn reference(&self) -> Instant {
        self.reference
    }

    /// Restart timing at `now`, e.g. when the stream starts.
    pub fn reset_reference(&mut self, now: Instant) {
        self.reference = now;
    }
}

impl MidiInputQueue for MidiInputReader {
    fn drain(&mut self, out: &mut [RawMidiMessage]) -> usize {
        self.drain_at(out, Instant::now())
    }

    fn reset_timing(&mut self) {
        self.reset_reference(Instant::now());
    }
}
