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
use std::path::Path;
use std::time::Duration;

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNEL_COUNT: u16 = 1;
const DEFAULT_BLOCK_COUNT: usize = 8;
const DEFAULT_BLOCK_FRAMES: usize = 512;
const DEFAULT_THREAD_PRIORITY: u8 = 70;
const MAX_CHANNEL_COUNT: u16 = 32;

/// A YAML representation of the engine configuration.
///
/// More or larger blocks raise latency and jitter tolerance. Fewer or smaller
/// blocks lower latency but make underruns more likely.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The output device. Names starting with "mock" select the mock sink.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Output channel count (default: 1).
    channel_count: Option<u16>,

    /// Number of blocks in the output ring (default: 8).
    block_count: Option<usize>,

    /// Frames per block (default: 512).
    block_frames: Option<usize>,

    /// Render thread priority, 0-99 (default: 70).
    thread_priority: Option<u8>,

    /// Whether to request real-time scheduling for the render thread (default: true).
    realtime: Option<bool>,
}

impl Engine {
    /// Creates a configuration where every option takes its default.
    pub fn new() -> Engine {
        Engine::default()
    }

    /// Parse an engine configuration from a file. The format is taken from the extension.
    pub fn deserialize(path: &Path) -> Result<Engine, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?)
    }

    pub fn with_device(mut self, device: &str) -> Engine {
        self.device = Some(device.to_string());
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Engine {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_channel_count(mut self, channel_count: u16) -> Engine {
        self.channel_count = Some(channel_count);
        self
    }

    pub fn with_block_count(mut self, block_count: usize) -> Engine {
        self.block_count = Some(block_count);
        self
    }

    pub fn with_block_frames(mut self, block_frames: usize) -> Engine {
        self.block_frames = Some(block_frames);
        self
    }

    pub fn with_realtime(mut self, realtime: bool) -> Engine {
        self.realtime = Some(realtime);
        self
    }

    /// Returns the device name.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the output sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 1).
    pub fn channel_count(&self) -> u16 {
        self.channel_count.unwrap_or(DEFAULT_CHANNEL_COUNT)
    }

    /// Returns the number of blocks in the ring (default: 8).
    pub fn block_count(&self) -> usize {
        self.block_count.unwrap_or(DEFAULT_BLOCK_COUNT)
    }

    /// Returns the number of frames per block (default: 512).
    pub fn block_frames(&self) -> usize {
        self.block_frames.unwrap_or(DEFAULT_BLOCK_FRAMES)
    }

    /// Returns the configured render thread priority (default: 70).
    pub fn thread_priority(&self) -> u8 {
        self.thread_priority.unwrap_or(DEFAULT_THREAD_PRIORITY)
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(true)
    }

    /// Worst-case output latency: every block in the ring queued at the device.
    pub fn latency(&self) -> Duration {
        let frames = self.block_count() as f64 * self.block_frames() as f64;
        Duration::from_secs_f64(frames / f64::from(self.sample_rate().max(1)))
    }

    /// Rejects values the engine can't start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid("sample_rate must be greater than 0".into()));
        }
        if self.channel_count() == 0 || self.channel_count() > MAX_CHANNEL_COUNT {
            return Err(ConfigError::Invalid(format!(
                "channel_count must be between 1 and {}, got {}",
                MAX_CHANNEL_COUNT,
                self.channel_count()
            )));
        }
        if self.block_count() == 0 {
            return Err(ConfigError::Invalid("block_count must be greater than 0".into()));
        }
        if self.block_frames() == 0 {
            return Err(ConfigError::Invalid("block_frames must be greater than 0".into()));
        }
        if self.thread_priority() > 99 {
            return Err(ConfigError::Invalid(format!(
                "thread_priority must be between 0 and 99, got {}",
                self.thread_priority()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Engine {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Engine::new();
        assert_eq!(config.device(), "default");
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.channel_count(), 1);
        assert_eq!(config.block_count(), 8);
        assert_eq!(config.block_frames(), 512);
        assert_eq!(config.thread_priority(), 70);
        assert!(config.realtime());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_yaml() {
        let config = parse(
            r#"
            device: mock-device
            sample_rate: 48000
            channel_count: 2
            block_count: 4
            block_frames: 256
            realtime: false
        "#,
        );

        assert_eq!(config.device(), "mock-device");
        assert_eq!(config.sample_rate(), 48000);
        assert_eq!(config.channel_count(), 2);
        assert_eq!(config.block_count(), 4);
        assert_eq!(config.block_frames(), 256);
        assert!(!config.realtime());
    }

    #[test]
    fn test_deserialize_partial_yaml_uses_defaults() {
        let config = parse("device: mock\n");
        assert_eq!(config.device(), "mock");
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.block_count(), 8);
    }

    #[test]
    fn test_deserialize_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "device: mock\nblock_frames: 128").unwrap();

        let config = Engine::deserialize(&path).unwrap();
        assert_eq!(config.device(), "mock");
        assert_eq!(config.block_frames(), 128);
    }

    #[test]
    fn test_deserialize_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Engine::deserialize(&dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(Engine::new().with_sample_rate(0).validate().is_err());
        assert!(Engine::new().with_channel_count(0).validate().is_err());
        assert!(Engine::new().with_channel_count(33).validate().is_err());
        assert!(Engine::new().with_block_count(0).validate().is_err());
        assert!(Engine::new().with_block_frames(0).validate().is_err());
    }

    #[test]
    fn test_latency() {
        let config = Engine::new()
            .with_sample_rate(1000)
            .with_block_count(4)
            .with_block_frames(250);
        assert_eq!(config.latency(), Duration::from_secs(1));
    }
}
