// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

use std::{fmt, time::Duration};

use super::error::SinkError;

/// Bit depth of every block handed to a sink.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Output format negotiated with the sink. Samples are always 16-bit signed integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channels per frame
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl OutputFormat {
    /// Creates a new OutputFormat
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, SinkError> {
        if sample_rate == 0 {
            return Err(SinkError::UnsupportedFormat(
                "Sample rate must be greater than 0".into(),
            ));
        }
        if channels == 0 {
            return Err(SinkError::UnsupportedFormat(
                "Channel count must be greater than 0".into(),
            ));
        }

        Ok(OutputFormat {
            sample_rate,
            channels,
            bits_per_sample: BITS_PER_SAMPLE,
        })
    }

    /// Seconds covered by one frame.
    pub fn time_step(&self) -> f64 {
        1.0 / f64::from(self.sample_rate)
    }

    /// Number of interleaved samples in a block of `frames` frames.
    pub fn block_len(&self, frames: usize) -> usize {
        frames * usize::from(self.channels)
    }

    /// Playback time of a block of `frames` frames. Rendering a block must
    /// take less than this or the device underruns.
    pub fn block_duration(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 * self.time_step())
    }

    /// Bytes per frame.
    pub fn block_align(&self) -> usize {
        usize::from(self.bits_per_sample / 8) * usize::from(self.channels)
    }
}

impl Default for OutputFormat {
    /// Creates a default output format (44.1kHz, mono, 16-bit)
    fn default() -> Self {
        OutputFormat {
            sample_rate: 44100,
            channels: 1,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_new() {
        let format = OutputFormat::new(48000, 2).unwrap();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.channels, 2);
        assert_eq!(format.bits_per_sample, 16);
    }

    #[test]
    fn test_output_format_new_invalid() {
        assert!(OutputFormat::new(0, 1).is_err());
        assert!(OutputFormat::new(44100, 0).is_err());
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::new(44100, 1).unwrap());
    }

    #[test]
    fn test_block_sizes() {
        let format = OutputFormat::new(44100, 2).unwrap();
        assert_eq!(format.block_len(512), 1024);
        assert_eq!(format.block_align(), 4);

        let format = OutputFormat::new(1000, 1).unwrap();
        assert_eq!(format.block_duration(500), Duration::from_millis(500));
    }

    #[test]
    fn test_display() {
        let format = OutputFormat::new(44100, 1).unwrap();
        assert_eq!(format.to_string(), "44100Hz/1ch/16-bit");
    }
}
