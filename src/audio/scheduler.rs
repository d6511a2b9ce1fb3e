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

//! The render loop.
//!
//! One thread owns the voices and the mixer. It waits for a free block,
//! renders it and submits it to the sink, until a stop is requested. Stopping
//! wakes the thread even if the sink never hands another block back.

use std::sync::Arc;
use std::thread;

use tracing::{error, info, span, Level};

use super::block::{Block, BlockCompletion, BlockRing};
use super::clock::GlobalClock;
use super::mixer::{to_i16, Mixer};
use super::thread_priority::RenderPriority;
use super::{OutputFormat, Sink};
use crate::error::EngineError;
use crate::samples::{PlaybackRegistry, Voice};

/// Fills blocks. Lives on the render thread once the scheduler starts.
pub(crate) struct Renderer {
    mixer: Mixer,
    voices: Vec<Voice>,
    registry: Arc<PlaybackRegistry>,
    clock: Arc<GlobalClock>,
    time_step: f64,
    frame: Vec<f32>,
}

impl Renderer {
    pub(crate) fn new(
        mixer: Mixer,
        registry: Arc<PlaybackRegistry>,
        clock: Arc<GlobalClock>,
        time_step: f64,
    ) -> Self {
        let channels = usize::from(mixer.channels());
        Self {
            mixer,
            voices: Vec::new(),
            registry,
            clock,
            time_step,
            frame: vec![0.0; channels],
        }
    }

    /// Applies pending play/stop requests, then renders every frame of the block.
    pub(crate) fn render_block(&mut self, block: &mut Block) {
        let mut retired = self.registry.apply_pending(&mut self.voices);

        let channels = self.frame.len().max(1);
        for cells in block.samples_mut().chunks_mut(channels) {
            retired += self.mixer.render_frame(
                &mut self.voices,
                self.clock.now(),
                self.time_step,
                &mut self.frame,
            );
            for (cell, value) in cells.iter_mut().zip(&self.frame) {
                *cell = to_i16(*value);
            }
            self.clock.advance(self.time_step);
        }

        self.registry.retire(retired);
    }
}

/// Runs the render loop against a sink.
pub(crate) struct BlockScheduler {
    ring: Arc<BlockRing>,
    render_thread: Option<thread::JoinHandle<Box<dyn Sink>>>,
}

impl BlockScheduler {
    /// Opens the sink and starts rendering. If the sink can't be opened no
    /// thread is started.
    pub(crate) fn start(
        mut sink: Box<dyn Sink>,
        format: &OutputFormat,
        block_count: usize,
        block_frames: usize,
        mut renderer: Renderer,
        priority: RenderPriority,
    ) -> Result<BlockScheduler, EngineError> {
        let ring = Arc::new(BlockRing::new(block_count, format.block_len(block_frames)));
        sink.open(format, BlockCompletion::new(ring.clone()))?;
        info!(
            sink = %sink,
            format = %format,
            block_count,
            block_frames,
            "Sink opened"
        );

        let thread_ring = ring.clone();
        let render_thread = thread::Builder::new()
            .name("blockmix-render".into())
            .spawn(move || {
                let span = span!(Level::INFO, "render loop");
                let _enter = span.enter();

                priority.apply();
                info!(
                    priority = priority.priority(),
                    realtime = priority.realtime(),
                    "Render loop started"
                );

                while let Some(mut block) = thread_ring.claim() {
                    renderer.render_block(&mut block);
                    sink.submit(block);
                }

                info!(
                    blocks = thread_ring.blocks_claimed(),
                    underruns = thread_ring.underruns(),
                    "Render loop stopped"
                );
                sink
            })
            .map_err(EngineError::Spawn)?;

        Ok(BlockScheduler {
            ring,
            render_thread: Some(render_thread),
        })
    }

    /// Stops the render loop, waits for it to exit and closes the sink.
    /// Later calls do nothing.
    pub(crate) fn stop(&mut self) {
        let Some(render_thread) = self.render_thread.take() else {
            return;
        };

        self.ring.request_stop();
        match render_thread.join() {
            Ok(mut sink) => {
                sink.close();
                info!(sink = %sink, "Sink closed");
            }
            Err(_) => error!("Render thread panicked"),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.render_thread.is_some()
    }

    pub(crate) fn blocks_rendered(&self) -> u64 {
        self.ring.blocks_claimed()
    }

    pub(crate) fn underruns(&self) -> u64 {
        self.ring.underruns()
    }

    pub(crate) fn free_blocks(&self) -> usize {
        self.ring.free_blocks()
    }
}

impl Drop for BlockScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::audio::mixer::{identity, silence};
    use crate::audio::mock;
    use crate::samples::{Sample, SampleHandle};
    use crate::testutil::eventually;

    fn renderer(format: &OutputFormat, registry: Arc<PlaybackRegistry>) -> Renderer {
        Renderer::new(
            Mixer::new(format.channels, silence(), identity()),
            registry,
            Arc::new(GlobalClock::new()),
            format.time_step(),
        )
    }

    fn start(sink: &mock::Sink, block_count: usize) -> Result<BlockScheduler, EngineError> {
        let format = OutputFormat::new(1000, 1).unwrap();
        BlockScheduler::start(
            Box::new(sink.clone()),
            &format,
            block_count,
            10,
            renderer(&format, Arc::new(PlaybackRegistry::new())),
            RenderPriority::new(0, false),
        )
    }

    #[test]
    fn test_render_block() {
        let format = OutputFormat::new(1000, 2).unwrap();
        let registry = Arc::new(PlaybackRegistry::new());
        let clock = Arc::new(GlobalClock::new());
        let mut renderer = Renderer::new(
            Mixer::new(2, silence(), identity()),
            registry.clone(),
            clock.clone(),
            format.time_step(),
        );
        registry.play(
            SampleHandle::from_id(1),
            Arc::new(Sample::new(vec![0.5, -0.5, 0.25, -0.25], 2, 1000)),
            false,
        )
        .unwrap();

        let ring = BlockRing::new(1, format.block_len(4));
        let mut block = ring.claim().unwrap();
        renderer.render_block(&mut block);

        assert_eq!(block.samples(), &[16383, -16383, 8191, -8191, 0, 0, 0, 0]);
        assert!((clock.now() - 0.004).abs() < 1e-9);
        assert_eq!(registry.active_voice_count(), 0);
    }

    #[test]
    fn test_fills_ring_then_waits() {
        let sink = mock::Sink::get("mock");
        let mut scheduler = start(&sink, 4).unwrap();

        eventually(|| sink.submitted_blocks() == 4, "Ring never filled");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.submitted_blocks(), 4);
        assert_eq!(scheduler.free_blocks(), 0);

        assert_eq!(sink.complete_blocks(2, Duration::from_secs(1)), 2);
        eventually(|| sink.submitted_blocks() == 6, "Completed blocks never refilled");
        assert_eq!(scheduler.blocks_rendered(), 6);

        scheduler.stop();
        assert!(!sink.is_open());
    }

    #[test]
    fn test_failing_sink_starts_nothing() {
        let sink = mock::Sink::failing("mock");
        let result = start(&sink, 4);
        assert!(matches!(
            result,
            Err(EngineError::Sink(crate::audio::SinkError::DeviceUnavailable(_)))
        ));
        assert_eq!(sink.submitted_blocks(), 0);
    }

    #[test]
    fn test_stop_while_waiting_is_bounded() {
        let sink = mock::Sink::get("mock");
        let mut scheduler = start(&sink, 2).unwrap();
        eventually(|| sink.submitted_blocks() == 2, "Ring never filled");

        let started = Instant::now();
        scheduler.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!scheduler.is_running());

        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_drop_stops_render_loop() {
        let sink = mock::Sink::get("mock");
        let scheduler = start(&sink, 2).unwrap();
        eventually(|| sink.is_open(), "Sink never opened");
        drop(scheduler);
        assert!(!sink.is_open());
    }
}
