//! Block pipeline driven through the driver seam.

use ostinato_core::format::{float_to_int32, int32_to_float};
use ostinato_core::prelude::*;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Gain plugin: every output is input 0 times `gain`. Keeps the deltas it
/// was handed.
struct GainPlugin {
    gain: f32,
    inputs: usize,
    outputs: usize,
    deltas: Arc<Mutex<Vec<Vec<i64>>>>,
}

impl PluginBridge for GainPlugin {
    fn open(&mut self) {}
    fn set_sample_rate(&mut self, _rate: f32) {}
    fn set_block_size(&mut self, _frames: usize) {}

    fn properties(&self) -> PluginProperties {
        PluginProperties {
            num_inputs: self.inputs,
            num_outputs: self.outputs,
            is_instrument: true,
        }
    }

    fn process_block(
        &mut self,
        inputs: &mut ChannelBufferSet,
        outputs: &mut ChannelBufferSet,
        frames: usize,
    ) {
        for channel in 0..outputs.num_channels() {
            for frame in 0..frames {
                outputs.channel_mut(channel)[frame] = inputs.channel(0)[frame] * self.gain;
            }
        }
    }

    fn set_block_events(&mut self, events: &[BlockMidiEvent]) -> usize {
        let deltas = ostinato_core::midi::with_deltas(events)
            .map(|(delta, _)| delta as i64)
            .collect();
        self.deltas.lock().push(deltas);
        events.len()
    }
}

/// Queue holding messages stamped in milliseconds.
struct TimedQueue(Vec<f64>);

impl MidiInputQueue for TimedQueue {
    fn drain(&mut self, out: &mut [RawMidiMessage]) -> usize {
        let count = self.0.len().min(out.len());
        for (slot, time) in out.iter_mut().zip(self.0.drain(..count)) {
            *slot = RawMidiMessage {
                data: [0x90, 60, 100, 0],
                rel_time_ms: time,
            };
        }
        count
    }
}

fn stereo_device(frames: usize) -> DeviceProperties {
    DeviceProperties {
        sample_rate: 48000.0,
        format: SampleFormat::Int32,
        num_inputs: 2,
        num_outputs: 2,
        buffer_frames: frames,
    }
}

fn int32_bytes(value: i32, frames: usize) -> Vec<u8> {
    (0..frames).flat_map(|_| value.to_ne_bytes()).collect()
}

fn first_sample(bytes: &[u8]) -> i32 {
    i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_manual_driver_runs_processor() {
    let deltas = Arc::new(Mutex::new(Vec::new()));
    let plugin = GainPlugin {
        gain: 0.5,
        inputs: 2,
        outputs: 2,
        deltas: deltas.clone(),
    };
    let queue = TimedQueue(vec![5.0]);

    let properties = stereo_device(256);
    let mut driver = ManualDriver::new(properties);
    let trigger = driver.trigger();
    let processor = BlockProcessor::new(properties, Box::new(plugin), Some(Box::new(queue)), 2048);
    let processor = Arc::new(Mutex::new(processor));
    let shared: SharedBufferSwitch = processor.clone();
    driver.start(shared).unwrap();

    trigger.set_input(0, &int32_bytes(float_to_int32(0.5), 256));
    assert!(trigger.run_block());

    let out = first_sample(&trigger.output(0));
    approx::assert_relative_eq!(int32_to_float(out), 0.25);
    assert_eq!(deltas.lock().as_slice(), &[vec![240]]);

    // Next block: nothing queued, no delivery
    assert!(trigger.run_block());
    assert_eq!(deltas.lock().len(), 1);
    assert_eq!(processor.lock().blocks(), 2);

    driver.stop().unwrap();
    assert!(!trigger.run_block());
}

#[test]
fn test_deltas_relative_to_previous_event() {
    let deltas = Arc::new(Mutex::new(Vec::new()));
    let plugin = GainPlugin {
        gain: 1.0,
        inputs: 1,
        outputs: 1,
        deltas: deltas.clone(),
    };
    // 48 samples per ms; the last one lands past the block end
    let queue = TimedQueue(vec![1.0, 1.0, 2.5, 100.0]);

    let properties = stereo_device(256);
    let mut processor = BlockProcessor::new(properties, Box::new(plugin), Some(Box::new(queue)), 16);
    let inputs = NativeBuffers::new(2, 256, SampleFormat::Int32);
    let mut outputs = NativeBuffers::new(2, 256, SampleFormat::Int32);
    processor.process(&inputs, &mut outputs);

    let deltas = deltas.lock();
    assert_eq!(deltas[0], vec![48, 0, 72, 135]);
    assert_eq!(deltas[0].iter().sum::<i64>(), 255);
}

#[test]
fn test_held_processor_lock_silences_block() {
    let plugin = GainPlugin {
        gain: 1.0,
        inputs: 2,
        outputs: 2,
        deltas: Arc::new(Mutex::new(Vec::new())),
    };
    let properties = stereo_device(64);
    let mut driver = ManualDriver::new(properties);
    let trigger = driver.trigger();
    let processor = Arc::new(Mutex::new(BlockProcessor::new(
        properties,
        Box::new(plugin),
        None,
        64,
    )));
    let shared: SharedBufferSwitch = processor.clone();
    driver.start(shared).unwrap();

    trigger.set_input(0, &int32_bytes(1 << 29, 64));
    let guard = processor.lock();
    assert!(!trigger.run_block());
    assert_eq!(first_sample(&trigger.output(0)), 0);
    drop(guard);

    assert!(trigger.run_block());
    assert_eq!(first_sample(&trigger.output(0)), 1 << 29);
}
