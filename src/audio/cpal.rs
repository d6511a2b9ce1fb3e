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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, warn, Level};

use super::{Block, BlockCompletion, OutputFormat, SinkError};

const DEFAULT_DEVICE: &str = "default";

/// Copies queued blocks into the device buffer from inside the cpal callback.
struct BlockPlayer {
    blocks: Receiver<Block>,
    current: Option<Block>,
    offset: usize,
    completion: BlockCompletion,
}

impl BlockPlayer {
    fn new(blocks: Receiver<Block>, completion: BlockCompletion) -> Self {
        Self {
            blocks,
            current: None,
            offset: 0,
            completion,
        }
    }

    /// Fills `data` from the queued blocks, completing each block once it has
    /// been copied out in full. Silence covers whatever the queue can't.
    fn fill(&mut self, data: &mut [i16]) {
        let mut written = 0;
        while written < data.len() {
            if self.current.is_none() {
                let Ok(block) = self.blocks.try_recv() else {
                    break;
                };
                self.current = Some(block);
                self.offset = 0;
            }
            let Some(block) = &self.current else {
                break;
            };

            let samples = block.samples();
            let count = (samples.len() - self.offset).min(data.len() - written);
            data[written..written + count]
                .copy_from_slice(&samples[self.offset..self.offset + count]);
            written += count;
            self.offset += count;

            if self.offset >= samples.len() {
                if let Some(block) = self.current.take() {
                    self.completion.complete(block);
                }
            }
        }
        data[written..].fill(0);
    }
}

/// Finds an output device by name. "default" is the default host's default
/// output device.
fn find_device(name: &str) -> Result<cpal::Device, SinkError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout().ok();
    let _shh_stderr = shh::stderr().ok();

    if name == DEFAULT_DEVICE {
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| SinkError::DeviceUnavailable("no default output device".into()));
    }

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                error!(err = e.to_string(), host = host_id.name(), "Unable to open host");
                continue;
            }
        };
        let devices = match host.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok(device);
            }
        }
    }

    Err(SinkError::DeviceUnavailable(format!(
        "no device found with name {}",
        name
    )))
}

/// A device that won't build or start a stream is unavailable, whatever the
/// reason it gives.
fn stream_error(err: impl fmt::Display) -> SinkError {
    SinkError::DeviceUnavailable(format!("unable to start output stream: {}", err))
}

/// Builds and starts a 16-bit output stream for `device`.
fn start_stream(
    device: &cpal::Device,
    format: &OutputFormat,
    mut player: BlockPlayer,
) -> Result<cpal::Stream, SinkError> {
    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| player.fill(data),
            |err| error!("CPAL output stream error: {}", err),
            None,
        )
        .map_err(stream_error)?;
    stream.play().map_err(stream_error)?;
    Ok(stream)
}

/// A sink that plays blocks on a cpal output device.
///
/// cpal streams can't move between threads on every platform, so the stream
/// lives on its own output thread for as long as the sink is open.
pub struct Sink {
    name: String,
    block_tx: Option<Sender<Block>>,
    shutdown_tx: Option<Sender<()>>,
    completion: Option<BlockCompletion>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Sink {
    /// Creates a sink for the named device. Nothing is opened until `open`.
    pub fn new(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            block_tx: None,
            shutdown_tx: None,
            completion: None,
            output_thread: None,
        }
    }
}

impl super::Sink for Sink {
    fn open(&mut self, format: &OutputFormat, completion: BlockCompletion) -> Result<(), SinkError> {
        if self.output_thread.is_some() {
            return Err(SinkError::DeviceUnavailable(format!(
                "{} is already open",
                self.name
            )));
        }

        let (block_tx, block_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), SinkError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let name = self.name.clone();
        let thread_format = format.clone();
        let player = BlockPlayer::new(block_rx, completion.clone());
        let output_thread = thread::Builder::new()
            .name("blockmix-cpal".into())
            .spawn(move || {
                let span = span!(Level::INFO, "cpal output", device = name.as_str());
                let _enter = span.enter();

                let stream = match find_device(&name)
                    .and_then(|device| start_stream(&device, &thread_format, player))
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                info!(format = %thread_format, "CPAL output stream started");

                // Keep the stream alive until close.
                let _ = shutdown_rx.recv();
                drop(stream);
                info!("CPAL output stream stopped");
            })
            .map_err(|e| SinkError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(SinkError::DeviceUnavailable(format!(
                    "output thread for {} exited",
                    self.name
                )));
            }
        }

        self.block_tx = Some(block_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.completion = Some(completion);
        self.output_thread = Some(output_thread);
        Ok(())
    }

    fn submit(&mut self, block: Block) {
        let block = match &self.block_tx {
            Some(block_tx) => match block_tx.send(block) {
                Ok(()) => return,
                Err(e) => e.into_inner(),
            },
            None => block,
        };

        // Nothing will play it; hand it straight back.
        warn!(device = self.name, "Block submitted to a closed sink");
        if let Some(completion) = &self.completion {
            completion.complete(block);
        }
    }

    fn close(&mut self) {
        self.block_tx = None;
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(output_thread) = self.output_thread.take() {
            if output_thread.join().is_err() {
                error!(device = self.name, "CPAL output thread panicked");
            }
        }
        self.completion = None;
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        super::Sink::close(self);
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (CPAL)", self.name)
    }
}
