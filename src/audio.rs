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
use std::fmt;

use crate::config;

pub mod block;
pub mod clock;
pub mod cpal;
pub mod error;
pub mod format;
pub mod mixer;
pub mod mock;
pub(crate) mod scheduler;
pub(crate) mod thread_priority;

pub use block::{Block, BlockCompletion};
pub use error::SinkError;
pub use format::OutputFormat;

/// An output device that plays blocks of interleaved 16-bit PCM.
///
/// Blocks are owned by the sink from `submit` until it hands them back through
/// the [`BlockCompletion`] given to `open`. Completion may happen on any thread.
pub trait Sink: fmt::Display + Send {
    /// Opens the device with the given format.
    fn open(&mut self, format: &OutputFormat, completion: BlockCompletion) -> Result<(), SinkError>;

    /// Queues a rendered block for playback. A sink that can't play the block
    /// must still complete it, or the render loop runs out of blocks.
    fn submit(&mut self, block: Block);

    /// Releases the device. Blocks still queued are dropped.
    fn close(&mut self);
}

/// Gets the sink for the configured device.
pub fn get_sink(config: &config::Engine) -> Result<Box<dyn Sink>, SinkError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Sink::self_clocked(device)));
    }

    Ok(Box::new(cpal::Sink::new(device)))
}
