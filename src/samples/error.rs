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
use std::io;

/// Error types for sample decoding
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Not a RIFF/WAVE file")]
    NotARiffWave,

    #[error("Audio data is truncated")]
    Truncated,

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// hound's message when the input ends before a read completes.
const SHORT_READ: &str = "Failed to read enough bytes";

impl From<hound::Error> for DecodeError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e)
                if e.kind() == io::ErrorKind::UnexpectedEof
                    || e.to_string().contains(SHORT_READ) =>
            {
                DecodeError::Truncated
            }
            hound::Error::FormatError(msg) if msg.contains(SHORT_READ) => DecodeError::Truncated,
            hound::Error::FormatError(msg) => DecodeError::UnsupportedFormat(msg.to_string()),
            other => DecodeError::UnsupportedFormat(other.to_string()),
        }
    }
}
