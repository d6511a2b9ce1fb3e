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
use std::path::PathBuf;

use crate::audio::SinkError;
use crate::config::ConfigError;
use crate::samples::{DecodeError, SampleHandle};

/// Errors returned synchronously by the engine API.
///
/// Underruns are never reported here; they only show up in
/// [`RenderStats`](crate::RenderStats).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid sample handle: {0}")]
    InvalidHandle(SampleHandle),

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Unable to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to start render thread: {0}")]
    Spawn(#[source] io::Error),
}
