//! Driver-native sample formats and conversion to the plugin's float domain.
//!
//! Only 32-bit integer buffers are converted. Integer samples are scaled by
//! 2^30 rather than 2^31, so full-scale float (±1.0) maps to half of the
//! integer range and the converter never clips on the way back.

use serde::{Deserialize, Serialize};

/// Scale between the float domain and 32-bit integer samples.
pub const INT32_SCALE: f32 = (1u32 << 30) as f32;

/// Native sample representation reported by an audio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    Int16,
    Int24,
    Int32,
    Float32,
    Float64,
}

impl SampleFormat {
    /// Width of one sample in a native buffer.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 => 3,
            SampleFormat::Int32 | SampleFormat::Float32 => 4,
            SampleFormat::Float64 => 8,
        }
    }

    /// Whether the block processor can convert this format. Anything else
    /// renders silence.
    pub fn is_convertible(self) -> bool {
        matches!(self, SampleFormat::Int32)
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SampleFormat::Int16 => "int16",
            SampleFormat::Int24 => "int24",
            SampleFormat::Int32 => "int32",
            SampleFormat::Float32 => "float32",
            SampleFormat::Float64 => "float64",
        };
        f.write_str(name)
    }
}

/// Stream properties fixed when the driver opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub sample_rate: f64,
    pub format: SampleFormat,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub buffer_frames: usize,
}

impl DeviceProperties {
    /// Bytes in one channel buffer of one block.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_frames * self.format.bytes_per_sample()
    }
}

/// Convert one 32-bit integer sample to float.
#[inline]
pub fn int32_to_float(sample: i32) -> f32 {
    sample as f32 / INT32_SCALE
}

/// Convert one float sample to a 32-bit integer. Out-of-range values saturate.
#[inline]
pub fn float_to_int32(sample: f32) -> i32 {
    (sample * INT32_SCALE) as i32
}

/// Decode a native-endian Int32 channel buffer into `out`.
///
/// Converts `min(native.len() / 4, out.len())` samples.
pub fn decode_int32(native: &[u8], out: &mut [f32]) {
    for (bytes, sample) in native.chunks_exact(4).zip(out.iter_mut()) {
        let raw = i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        *sample = int32_to_float(raw);
    }
}

/// Encode float samples into a native-endian Int32 channel buffer.
pub fn encode_int32(input: &[f32], native: &mut [u8]) {
    for (sample, bytes) in input.iter().zip(native.chunks_exact_mut(4)) {
        bytes.copy_from_slice(&float_to_int32(*sample).to_ne_bytes());
    }
}
