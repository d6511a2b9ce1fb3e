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
use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use super::error::DecodeError;
use super::store::Sample;
use crate::audio::format::BITS_PER_SAMPLE;
use crate::audio::OutputFormat;

/// Turns encoded audio into a sample ready for the store.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Sample, DecodeError>;
}

/// Decodes RIFF/WAVE data.
///
/// Only 16-bit integer PCM at the output sample rate is accepted. Anything
/// else is a format error rather than something to convert.
pub struct WavDecoder {
    sample_rate: u32,
    channels: u16,
}

impl WavDecoder {
    pub fn new(format: &OutputFormat) -> Self {
        Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
        }
    }

    fn check_header(bytes: &[u8]) -> Result<(), DecodeError> {
        let prefix_len = bytes.len().min(4);
        if bytes[..prefix_len] != b"RIFF"[..prefix_len] {
            return Err(DecodeError::NotARiffWave);
        }
        if bytes.len() < 12 {
            return Err(DecodeError::Truncated);
        }
        if &bytes[8..12] != b"WAVE" {
            return Err(DecodeError::NotARiffWave);
        }

        // The RIFF size field counts everything after the first 8 bytes.
        let riff_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if u64::from(riff_len) + 8 > bytes.len() as u64 {
            return Err(DecodeError::Truncated);
        }
        Ok(())
    }

    fn check_spec(&self, spec: &WavSpec) -> Result<(), DecodeError> {
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != BITS_PER_SAMPLE {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{}-bit {:?}, expected {}-bit integer PCM",
                spec.bits_per_sample, spec.sample_format, BITS_PER_SAMPLE
            )));
        }
        if spec.sample_rate != self.sample_rate {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} Hz, expected {} Hz",
                spec.sample_rate, self.sample_rate
            )));
        }
        if spec.channels == 0 {
            return Err(DecodeError::UnsupportedFormat("no channels".into()));
        }
        Ok(())
    }
}

impl Decoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Sample, DecodeError> {
        Self::check_header(bytes)?;

        let reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        self.check_spec(&spec)?;

        let expected = reader.len() as usize;
        let scale = 1.0 / 32768.0;
        let data = reader
            .into_samples::<i16>()
            .map(|sample| sample.map(|value| f32::from(value) * scale))
            .collect::<Result<Vec<f32>, hound::Error>>()?;
        if data.len() < expected {
            return Err(DecodeError::Truncated);
        }

        debug!(
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            values = data.len(),
            "Decoded WAV data"
        );

        Ok(Sample::new(data, spec.channels, spec.sample_rate).with_channel_count(self.channels))
    }
}

/// Encodes a sample as 16-bit integer PCM WAV data.
pub fn encode_wav(sample: &Sample) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: sample.channel_count(),
        sample_rate: sample.sample_rate(),
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)?;
    for value in sample.data() {
        let scaled = (value * 32768.0)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX));
        writer.write_sample(scaled as i16)?;
    }
    writer.finalize()?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::audio::sine;

    fn decoder(sample_rate: u32, channels: u16) -> WavDecoder {
        WavDecoder::new(&OutputFormat::new(sample_rate, channels).unwrap())
    }

    fn encode_with_spec(spec: WavSpec, frames: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for _ in 0..frames * usize::from(spec.channels) {
            match spec.bits_per_sample {
                8 => writer.write_sample(0i8).unwrap(),
                _ => writer.write_sample(0i16).unwrap(),
            }
        }
        writer.finalize().unwrap();
        bytes
    }

    #[test]
    fn test_round_trip() {
        let original = Sample::new(sine(440.0, 0.8, 44100, 4410), 1, 44100);
        let bytes = encode_wav(&original).unwrap();
        let decoded = decoder(44100, 1).decode(&bytes).unwrap();

        assert_eq!(decoded.frame_count(), original.frame_count());
        for (a, b) in original.data().iter().zip(decoded.data()) {
            assert!((a - b).abs() <= 1.0 / 32768.0, "{a} vs {b}");
        }
    }

    #[test]
    fn test_not_riff() {
        let result = decoder(44100, 1).decode(b"OggS\0\0\0\0\0\0\0\0\0\0\0\0");
        assert!(matches!(result, Err(DecodeError::NotARiffWave)));
    }

    #[test]
    fn test_riff_but_not_wave() {
        let result = decoder(44100, 1).decode(b"RIFF\x04\0\0\0AVI ");
        assert!(matches!(result, Err(DecodeError::NotARiffWave)));
    }

    #[test]
    fn test_short_header_is_truncated() {
        assert!(matches!(
            decoder(44100, 1).decode(b"RIFF\x04\0"),
            Err(DecodeError::Truncated)
        ));
        assert!(matches!(
            decoder(44100, 1).decode(&[]),
            Err(DecodeError::Truncated)
        ));
    }

    #[test]
    fn test_truncated_data() {
        let sample = Sample::new(sine(440.0, 0.5, 44100, 1000), 1, 44100);
        let bytes = encode_wav(&sample).unwrap();
        for cut in [1, 2, 100, 101, 1000] {
            let result = decoder(44100, 1).decode(&bytes[..bytes.len() - cut]);
            assert!(
                matches!(result, Err(DecodeError::Truncated)),
                "cut {cut}: {result:?}"
            );
        }
    }

    #[test]
    fn test_truncated_header() {
        let sample = Sample::new(sine(440.0, 0.5, 44100, 1000), 1, 44100);
        let bytes = encode_wav(&sample).unwrap();
        for keep in [12, 16, 20, 30, 40, 44] {
            let result = decoder(44100, 1).decode(&bytes[..keep]);
            assert!(
                matches!(result, Err(DecodeError::Truncated)),
                "kept {keep}: {result:?}"
            );
        }
    }

    #[test]
    fn test_short_read_is_truncated() {
        let err = hound::Error::FormatError("Failed to read enough bytes.");
        assert!(matches!(DecodeError::from(err), DecodeError::Truncated));
        let err = hound::Error::FormatError("no fmt chunk found");
        assert!(matches!(
            DecodeError::from(err),
            DecodeError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn test_wrong_bit_depth() {
        let bytes = encode_with_spec(
            WavSpec {
                channels: 1,
                sample_rate: 44100,
                bits_per_sample: 8,
                sample_format: SampleFormat::Int,
            },
            100,
        );
        let result = decoder(44100, 1).decode(&bytes);
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_wrong_sample_rate() {
        let bytes = encode_with_spec(
            WavSpec {
                channels: 1,
                sample_rate: 48000,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            100,
        );
        let result = decoder(44100, 1).decode(&bytes);
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_mono_decoded_to_stereo() {
        let bytes = encode_wav(&Sample::new(vec![0.5, -0.5], 1, 44100)).unwrap();
        let decoded = decoder(44100, 2).decode(&bytes).unwrap();
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.data(), &[0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_stereo_decoded_to_mono() {
        let bytes = encode_wav(&Sample::new(vec![0.5, 0.25, -0.5, 0.0], 2, 44100)).unwrap();
        let decoded = decoder(44100, 1).decode(&bytes).unwrap();
        assert_eq!(decoded.channel_count(), 1);
        assert_eq!(decoded.data(), &[0.375, -0.25]);
    }
}
