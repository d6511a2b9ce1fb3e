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
use std::{
    collections::VecDeque,
    fmt,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, span, Level};

use super::{Block, BlockCompletion, OutputFormat, SinkError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Blocks are completed by the test through `complete_blocks`.
    Manual,
    /// Open always fails.
    Failing,
    /// A ticker thread completes one block per block duration.
    SelfClocked,
}

#[derive(Default)]
struct MockState {
    queue: VecDeque<Block>,
    completion: Option<BlockCompletion>,
    open: bool,
    submitted: u64,
    ticker: Option<thread::JoinHandle<()>>,
}

struct Shared {
    state: Mutex<MockState>,
    changed: Condvar,
}

/// A mock sink. Doesn't actually play anything; blocks are held until they
/// are completed by the test or by the ticker.
#[derive(Clone)]
pub struct Sink {
    name: String,
    mode: Mode,
    shared: Arc<Shared>,
}

impl Sink {
    /// Gets a mock sink whose blocks are only completed by `complete_blocks`.
    pub fn get(name: &str) -> Sink {
        Self::with_mode(name, Mode::Manual)
    }

    /// Gets a mock sink that can't be opened.
    pub fn failing(name: &str) -> Sink {
        Self::with_mode(name, Mode::Failing)
    }

    /// Gets a mock sink that completes blocks at the pace a real device would.
    pub fn self_clocked(name: &str) -> Sink {
        Self::with_mode(name, Mode::SelfClocked)
    }

    fn with_mode(name: &str, mode: Mode) -> Sink {
        Sink {
            name: name.to_string(),
            mode,
            shared: Arc::new(Shared {
                state: Mutex::new(MockState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Completes up to `count` blocks in submission order, waiting for each
    /// one to be submitted. Gives up once `timeout` has passed and returns how
    /// many were completed.
    pub fn complete_blocks(&self, count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut completed = 0;
        while completed < count {
            let mut state = self.shared.state.lock();
            while state.queue.is_empty() && state.open {
                if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            let (Some(block), Some(completion)) = (state.queue.pop_front(), state.completion.clone())
            else {
                break;
            };
            drop(state);

            completion.complete(block);
            completed += 1;
        }
        completed
    }

    /// Number of blocks submitted since the sink was created.
    pub fn submitted_blocks(&self) -> u64 {
        self.shared.state.lock().submitted
    }

    /// Copies of the blocks waiting to be completed, oldest first.
    pub fn queued_blocks(&self) -> Vec<Vec<i16>> {
        self.shared
            .state
            .lock()
            .queue
            .iter()
            .map(|block| block.samples().to_vec())
            .collect()
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// Plays queued blocks in real time: each block is held for its own
    /// duration before it is completed.
    fn tick(shared: Arc<Shared>, format: OutputFormat) {
        let span = span!(Level::DEBUG, "mock sink ticker");
        let _enter = span.enter();

        let channels = usize::from(format.channels);
        let mut state = shared.state.lock();
        loop {
            while state.open && state.queue.is_empty() {
                shared.changed.wait(&mut state);
            }
            let Some(len) = state.queue.front().map(|block| block.samples().len()) else {
                break;
            };

            let deadline = Instant::now() + format.block_duration(len / channels);
            while state.open && !shared.changed.wait_until(&mut state, deadline).timed_out() {}
            if !state.open {
                break;
            }

            let (Some(block), Some(completion)) = (state.queue.pop_front(), state.completion.clone())
            else {
                break;
            };
            drop(state);
            completion.complete(block);
            state = shared.state.lock();
        }
        debug!("Mock sink ticker stopped");
    }
}

impl super::Sink for Sink {
    fn open(&mut self, format: &OutputFormat, completion: BlockCompletion) -> Result<(), SinkError> {
        if self.mode == Mode::Failing {
            return Err(SinkError::DeviceUnavailable(self.name.clone()));
        }

        let mut state = self.shared.state.lock();
        state.open = true;
        state.completion = Some(completion);
        if self.mode == Mode::SelfClocked {
            let shared = self.shared.clone();
            let format = format.clone();
            state.ticker = Some(thread::spawn(move || Sink::tick(shared, format)));
        }
        info!(device = self.name, format = %format, "Mock sink opened");
        Ok(())
    }

    fn submit(&mut self, block: Block) {
        let mut state = self.shared.state.lock();
        state.submitted += 1;
        state.queue.push_back(block);
        self.shared.changed.notify_all();
    }

    fn close(&mut self) {
        let mut state = self.shared.state.lock();
        if !state.open {
            return;
        }
        state.open = false;
        state.queue.clear();
        state.completion = None;
        let ticker = state.ticker.take();
        self.shared.changed.notify_all();
        drop(state);

        if let Some(ticker) = ticker {
            let _ = ticker.join();
        }
        info!(device = self.name, "Mock sink closed");
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
