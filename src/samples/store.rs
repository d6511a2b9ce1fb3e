// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! In-memory sample storage.
//!
//! Samples are decoded once and kept for the lifetime of the engine. There is
//! no unload, so a handle is simply the sample's position in the store plus
//! one and never goes stale. Adding unload would need generation-tagged
//! handles instead.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::error::DecodeError;
use super::wav::{Decoder, WavDecoder};
use crate::audio::OutputFormat;
use crate::error::EngineError;

/// Identifies a loaded sample. Handles start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleHandle(usize);

impl SampleHandle {
    /// Wraps a raw handle value, e.g. one stored by the host. Whether it
    /// refers to anything is checked when it's used.
    pub fn from_id(id: usize) -> Self {
        SampleHandle(id)
    }

    pub fn id(self) -> usize {
        self.0
    }
}

impl fmt::Display for SampleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable PCM data as interleaved f32 frames in [-1, 1].
#[derive(Clone, PartialEq)]
pub struct Sample {
    data: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
}

impl Sample {
    /// Creates a sample from interleaved data. A trailing partial frame is dropped
    /// and values are clamped to [-1, 1].
    pub fn new(mut data: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        let channels = usize::from(channel_count);
        let whole_frames = if channels == 0 { 0 } else { data.len() / channels };
        data.truncate(whole_frames * channels);
        for value in data.iter_mut() {
            *value = value.clamp(-1.0, 1.0);
        }

        Self {
            data,
            channel_count,
            sample_rate,
        }
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (one value per channel).
    pub fn frame_count(&self) -> usize {
        match self.channel_count {
            0 => 0,
            channels => self.data.len() / usize::from(channels),
        }
    }

    /// Interleaved data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The values of one frame, or an empty slice past the end.
    pub fn frame(&self, index: usize) -> &[f32] {
        let channels = usize::from(self.channel_count);
        let start = index.saturating_mul(channels);
        self.data.get(start..start + channels).unwrap_or(&[])
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Converts to `target` channels. Mono is copied to every output channel,
    /// anything mixed down to mono is averaged, and other layouts wrap source
    /// channels around the output channels.
    pub fn with_channel_count(self, target: u16) -> Sample {
        if target == self.channel_count || target == 0 || self.channel_count == 0 {
            return self;
        }

        let source = usize::from(self.channel_count);
        let target_channels = usize::from(target);
        let mut data = Vec::with_capacity(self.frame_count() * target_channels);
        for frame in self.data.chunks_exact(source) {
            if target_channels == 1 {
                data.push(frame.iter().sum::<f32>() / source as f32);
            } else {
                data.extend((0..target_channels).map(|channel| frame[channel % source]));
            }
        }

        Sample {
            data,
            channel_count: target,
            sample_rate: self.sample_rate,
        }
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frame_count", &self.frame_count())
            .finish()
    }
}

/// Append-only storage for decoded samples.
pub struct SampleStore {
    samples: RwLock<Vec<Arc<Sample>>>,
    decoder: Box<dyn Decoder>,
    format: OutputFormat,
    closed: AtomicBool,
}

impl SampleStore {
    /// Creates a store that decodes WAV data into the given output format.
    pub fn new(format: &OutputFormat) -> Self {
        Self::with_decoder(format, Box::new(WavDecoder::new(format)))
    }

    pub fn with_decoder(format: &OutputFormat, decoder: Box<dyn Decoder>) -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            decoder,
            format: format.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Decodes and stores a sample. Nothing is stored if decoding fails.
    pub fn load(&self, bytes: &[u8]) -> Result<SampleHandle, EngineError> {
        self.ensure_open()?;
        let sample = self.decoder.decode(bytes)?;
        self.insert(sample)
    }

    /// Stores an already decoded sample, converting it to the output channel count.
    /// The sample rate has to match the output; there is no resampling.
    pub fn insert(&self, sample: Sample) -> Result<SampleHandle, EngineError> {
        self.ensure_open()?;
        if sample.sample_rate() != self.format.sample_rate {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} Hz sample, output runs at {} Hz",
                sample.sample_rate(),
                self.format.sample_rate
            ))
            .into());
        }

        let sample = Arc::new(sample.with_channel_count(self.format.channels));
        let mut samples = self.samples.write();
        samples.push(sample.clone());
        let handle = SampleHandle(samples.len());
        drop(samples);

        info!(
            handle = handle.id(),
            channels = sample.channel_count(),
            frames = sample.frame_count(),
            duration_ms = sample.duration().as_millis(),
            memory_kb = sample.memory_size() / 1024,
            "Sample loaded"
        );
        Ok(handle)
    }

    /// Returns the sample for a handle previously returned by this store.
    pub fn lookup(&self, handle: SampleHandle) -> Result<Arc<Sample>, EngineError> {
        handle
            .0
            .checked_sub(1)
            .and_then(|index| self.samples.read().get(index).cloned())
            .ok_or(EngineError::InvalidHandle(handle))
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total memory used by stored samples.
    pub fn memory_usage(&self) -> usize {
        self.samples.read().iter().map(|s| s.memory_size()).sum()
    }

    /// Rejects all further loads. Stored samples stay readable.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(samples = self.len(), "Sample store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::ShuttingDown);
        }
        Ok(())
    }
}

impl fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStore")
            .field("samples", &self.len())
            .field("format", &self.format)
            .field("total_memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}
