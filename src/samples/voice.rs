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

//! Voices and the registry used to start and stop them.
//!
//! Callers never touch the render thread's voice list. Play and stop requests
//! go through a channel that the renderer drains at the start of every block,
//! so a request takes effect within one block and the list is never resized
//! while it is being mixed.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::store::{Sample, SampleHandle};
use crate::error::EngineError;

/// One in-progress playback of a loaded sample.
pub struct Voice {
    handle: SampleHandle,
    sample: Arc<Sample>,
    position: usize,
    looping: bool,
    finished: bool,
}

impl Voice {
    pub fn new(handle: SampleHandle, sample: Arc<Sample>, looping: bool) -> Self {
        Self {
            handle,
            sample,
            position: 0,
            looping,
            finished: false,
        }
    }

    pub fn handle(&self) -> SampleHandle {
        self.handle
    }

    /// Current frame position in the sample.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Adds the current frame into `frame`, then moves forward by one output
    /// frame's worth of sample frames. Reaching the end of the sample, exactly
    /// or past it, marks the voice finished.
    pub fn mix_into(&mut self, frame: &mut [f32], time_step: f64) {
        if self.finished {
            return;
        }

        if self.position < self.sample.frame_count() {
            for (out, value) in frame.iter_mut().zip(self.sample.frame(self.position)) {
                *out += value;
            }
        }

        let step = (time_step * f64::from(self.sample.sample_rate())).round() as usize;
        self.position += step.max(1);
        if self.position >= self.sample.frame_count() {
            self.finished = true;
        }
    }

    /// Starts again from the first frame.
    pub fn restart(&mut self) {
        self.position = 0;
        self.finished = false;
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("handle", &self.handle)
            .field("position", &self.position)
            .field("looping", &self.looping)
            .field("finished", &self.finished)
            .finish()
    }
}

enum Command {
    Play(Voice),
    Stop(SampleHandle),
}

#[derive(Default)]
struct RegistryState {
    active: usize,
    closed: bool,
}

/// Accepts play and stop requests from any thread and tracks how many voices
/// are active, including ones the renderer hasn't picked up yet.
pub struct PlaybackRegistry {
    command_tx: Sender<Command>,
    command_rx: Receiver<Command>,
    state: Mutex<RegistryState>,
    idle: Condvar,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        Self {
            command_tx,
            command_rx,
            state: Mutex::new(RegistryState::default()),
            idle: Condvar::new(),
        }
    }

    /// Queues a new voice. It counts as active immediately.
    pub fn play(
        &self,
        handle: SampleHandle,
        sample: Arc<Sample>,
        looping: bool,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(EngineError::ShuttingDown);
        }
        state.active += 1;
        // The registry holds the receiver, so the channel can't be disconnected.
        let _ = self
            .command_tx
            .send(Command::Play(Voice::new(handle, sample, looping)));
        debug!(handle = handle.id(), looping, "Voice queued");
        Ok(())
    }

    /// Queues removal of every voice playing `handle`. Does nothing if none are.
    pub fn stop(&self, handle: SampleHandle) -> Result<(), EngineError> {
        let state = self.state.lock();
        if state.closed {
            return Err(EngineError::ShuttingDown);
        }
        let _ = self.command_tx.send(Command::Stop(handle));
        debug!(handle = handle.id(), "Stop queued");
        Ok(())
    }

    /// Voices playing or queued to play.
    pub fn active_voice_count(&self) -> usize {
        self.state.lock().active
    }

    /// Whether the registry has been reset for good.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Blocks until no voices are active or the timeout passes. Returns whether
    /// playback finished.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.active > 0 {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.active == 0;
            }
        }
        true
    }

    /// Applies queued requests to the renderer's voice list. Returns how many
    /// voices were stopped.
    pub(crate) fn apply_pending(&self, voices: &mut Vec<Voice>) -> usize {
        let mut stopped = 0;
        for command in self.command_rx.try_iter() {
            match command {
                Command::Play(voice) => voices.push(voice),
                Command::Stop(handle) => {
                    let before = voices.len();
                    voices.retain(|voice| voice.handle != handle);
                    stopped += before - voices.len();
                }
            }
        }
        if stopped > 0 {
            trace!(stopped, "Voices stopped");
        }
        stopped
    }

    /// Records that the renderer dropped `count` voices.
    pub(crate) fn retire(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(count);
        if state.active == 0 {
            self.idle.notify_all();
        }
    }

    /// Drops everything queued, refuses later requests and releases idle
    /// waiters. Used once the renderer has stopped for good.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let dropped = self.command_rx.try_iter().count();
        state.active = 0;
        self.idle.notify_all();
        debug!(dropped, "Playback registry reset");
    }
}

impl Default for PlaybackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
