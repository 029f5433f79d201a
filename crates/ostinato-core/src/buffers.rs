//! Fixed-size per-channel buffers.
//!
//! Both buffer types are sized when a stream opens and never resized, so the
//! audio thread only ever overwrites memory it already owns.

use crate::format::SampleFormat;

/// Float sample buffers, one per channel, each `frames` long.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBufferSet {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl ChannelBufferSet {
    pub fn new(num_channels: usize, frames: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| vec![0.0; frames]).collect(),
            frames,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    /// Zero every channel from `first` onwards.
    pub fn clear_from(&mut self, first: usize) {
        for channel in self.channels.iter_mut().skip(first) {
            channel.fill(0.0);
        }
    }

    pub fn clear(&mut self) {
        self.clear_from(0);
    }
}

/// Driver-native byte buffers, one per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeBuffers {
    channels: Vec<Vec<u8>>,
    format: SampleFormat,
    frames: usize,
}

impl NativeBuffers {
    pub fn new(num_channels: usize, frames: usize, format: SampleFormat) -> Self {
        let bytes = frames * format.bytes_per_sample();
        Self {
            channels: (0..num_channels).map(|_| vec![0; bytes]).collect(),
            format,
            frames,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[u8] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.channels[index]
    }

    /// Fill every channel with zero bytes, which is silence in all formats.
    pub fn fill_silence(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0);
        }
    }
}
