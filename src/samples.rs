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

//! Sample storage and voice bookkeeping.
//!
//! This module provides:
//! - WAV decoding into in-memory float samples
//! - An append-only store handing out stable sample handles
//! - Voices and the registry callers use to start and stop them

mod error;
mod store;
mod voice;
mod wav;

pub use error::DecodeError;
pub use store::{Sample, SampleHandle, SampleStore};
pub use voice::{PlaybackRegistry, Voice};
pub use wav::{encode_wav, Decoder, WavDecoder};
