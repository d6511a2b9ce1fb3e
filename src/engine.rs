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

//! The engine ties the sample store, the playback registry and the render
//! loop together behind a thread-safe API.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::clock::GlobalClock;
use crate::audio::mixer::{self, Filter, Generator, Mixer};
use crate::audio::scheduler::{BlockScheduler, Renderer};
use crate::audio::thread_priority::RenderPriority;
use crate::audio::{self, OutputFormat, Sink};
use crate::config;
use crate::error::EngineError;
use crate::samples::{PlaybackRegistry, Sample, SampleHandle, SampleStore};

/// Render loop counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// Blocks rendered since start.
    pub blocks_rendered: u64,
    /// Times the sink had played every block before the next one was ready.
    pub underruns: u64,
    /// Blocks currently writable.
    pub free_blocks: usize,
}

/// Configures and starts an [`Engine`].
pub struct EngineBuilder {
    config: config::Engine,
    generator: Box<dyn Generator>,
    filter: Box<dyn Filter>,
}

impl EngineBuilder {
    /// Adds synthesized audio to every output cell.
    pub fn generator<G: Generator + 'static>(mut self, generator: G) -> Self {
        self.generator = Box::new(generator);
        self
    }

    /// Post-processes every mixed cell before clipping.
    pub fn filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Starts the engine on the configured device.
    pub fn start(self) -> Result<Engine, EngineError> {
        self.config.validate()?;
        let sink = audio::get_sink(&self.config)?;
        self.start_with_sink(sink)
    }

    /// Starts the engine on the given sink. Fails without starting anything
    /// if the sink can't be opened.
    pub fn start_with_sink(self, sink: Box<dyn Sink>) -> Result<Engine, EngineError> {
        let config = self.config;
        config.validate()?;

        let format = OutputFormat::new(config.sample_rate(), config.channel_count())?;
        let store = SampleStore::new(&format);
        let registry = Arc::new(PlaybackRegistry::new());
        let clock = Arc::new(GlobalClock::new());

        let renderer = Renderer::new(
            Mixer::new(format.channels, self.generator, self.filter),
            registry.clone(),
            clock.clone(),
            format.time_step(),
        );
        let scheduler = BlockScheduler::start(
            sink,
            &format,
            config.block_count(),
            config.block_frames(),
            renderer,
            RenderPriority::from_config(&config),
        )?;

        info!(
            format = %format,
            block_count = config.block_count(),
            block_frames = config.block_frames(),
            latency_ms = config.latency().as_millis(),
            "Engine started"
        );

        Ok(Engine {
            config,
            format,
            store,
            registry,
            clock,
            scheduler: Mutex::new(scheduler),
        })
    }
}

/// A running sample playback engine.
///
/// All methods take `&self`, so the engine can be shared between threads.
/// Dropping it shuts it down.
pub struct Engine {
    config: config::Engine,
    format: OutputFormat,
    store: SampleStore,
    registry: Arc<PlaybackRegistry>,
    clock: Arc<GlobalClock>,
    scheduler: Mutex<BlockScheduler>,
}

impl Engine {
    pub fn builder(config: config::Engine) -> EngineBuilder {
        EngineBuilder {
            config,
            generator: mixer::silence(),
            filter: mixer::identity(),
        }
    }

    /// Starts an engine without hooks on the configured device.
    pub fn start(config: config::Engine) -> Result<Engine, EngineError> {
        Engine::builder(config).start()
    }

    /// Reads and decodes a WAV file.
    pub fn load_sample<P: AsRef<Path>>(&self, path: P) -> Result<SampleHandle, EngineError> {
        if self.store.is_closed() {
            return Err(EngineError::ShuttingDown);
        }

        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let handle = self.store.load(&bytes)?;
        debug!(path = %path.display(), handle = handle.id(), "Loaded sample file");
        Ok(handle)
    }

    /// Decodes WAV data already in memory.
    pub fn load_sample_bytes(&self, bytes: &[u8]) -> Result<SampleHandle, EngineError> {
        self.store.load(bytes)
    }

    /// Stores a sample built by the caller. It must be at the output sample
    /// rate; channels are converted.
    pub fn add_sample(&self, sample: Sample) -> Result<SampleHandle, EngineError> {
        self.store.insert(sample)
    }

    pub fn sample(&self, handle: SampleHandle) -> Result<Arc<Sample>, EngineError> {
        self.store.lookup(handle)
    }

    /// Starts a new voice for the sample.
    pub fn play(&self, handle: SampleHandle) -> Result<(), EngineError> {
        self.start_voice(handle, false)
    }

    /// Starts a voice that repeats until stopped.
    pub fn play_looping(&self, handle: SampleHandle) -> Result<(), EngineError> {
        self.start_voice(handle, true)
    }

    /// Stops every voice playing the sample. Does nothing if none are.
    pub fn stop(&self, handle: SampleHandle) -> Result<(), EngineError> {
        if self.store.is_closed() {
            return Err(EngineError::ShuttingDown);
        }
        self.store.lookup(handle)?;
        self.registry.stop(handle)
    }

    /// Voices playing or about to play.
    pub fn active_voice_count(&self) -> usize {
        self.registry.active_voice_count()
    }

    /// Blocks until every voice has finished or the timeout passes. Returns
    /// whether playback finished.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.registry.wait_until_idle(timeout)
    }

    /// Seconds of audio rendered so far.
    pub fn global_time(&self) -> f64 {
        self.clock.now()
    }

    pub fn stats(&self) -> RenderStats {
        let scheduler = self.scheduler.lock();
        RenderStats {
            blocks_rendered: scheduler.blocks_rendered(),
            underruns: scheduler.underruns(),
            free_blocks: scheduler.free_blocks(),
        }
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn config(&self) -> &config::Engine {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_running()
    }

    /// Stops the render loop and closes the sink. Blocks until the render
    /// thread has exited. Safe to call more than once.
    pub fn shutdown(&self) {
        self.store.close();
        let mut scheduler = self.scheduler.lock();
        if !scheduler.is_running() {
            return;
        }
        scheduler.stop();
        drop(scheduler);

        self.registry.reset();
        info!(global_time = self.clock.now(), "Engine stopped");
    }

    fn start_voice(&self, handle: SampleHandle, looping: bool) -> Result<(), EngineError> {
        if self.store.is_closed() {
            return Err(EngineError::ShuttingDown);
        }
        let sample = self.store.lookup(handle)?;
        self.registry.play(handle, sample, looping)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
