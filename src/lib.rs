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

//! Real-time sample playback.
//!
//! Decoded samples are kept in memory and mixed into a ring of fixed-size
//! output blocks by a dedicated render thread. Blocks are handed to a [`Sink`]
//! and come back when the device has played them. Callers start and stop
//! voices from any thread while the render loop is running.
//!
//! [`Sink`]: audio::Sink

pub mod audio;
pub mod config;
mod engine;
pub mod error;
pub mod samples;

#[cfg(test)]
mod testutil;

pub use audio::mixer::{Filter, Generator};
pub use engine::{Engine, EngineBuilder, RenderStats};
pub use error::EngineError;
pub use samples::{Sample, SampleHandle};
