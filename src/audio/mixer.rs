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

//! Mixes voices into output frames. Runs on the render thread only.

use crate::samples::Voice;

/// Synthesized audio added to every output cell before filtering.
///
/// Any `FnMut(channel, global_time, time_step) -> f32` closure works.
pub trait Generator: Send {
    fn generate(&mut self, channel: u16, global_time: f64, time_step: f64) -> f32;
}

impl<F> Generator for F
where
    F: FnMut(u16, f64, f64) -> f32 + Send,
{
    fn generate(&mut self, channel: u16, global_time: f64, time_step: f64) -> f32 {
        self(channel, global_time, time_step)
    }
}

/// Post-processing applied to each mixed cell before clipping.
///
/// Any `FnMut(channel, global_time, sample) -> f32` closure works.
pub trait Filter: Send {
    fn filter(&mut self, channel: u16, global_time: f64, sample: f32) -> f32;
}

impl<F> Filter for F
where
    F: FnMut(u16, f64, f32) -> f32 + Send,
{
    fn filter(&mut self, channel: u16, global_time: f64, sample: f32) -> f32 {
        self(channel, global_time, sample)
    }
}

/// A generator that adds nothing.
pub fn silence() -> Box<dyn Generator> {
    Box::new(|_: u16, _: f64, _: f64| 0.0f32)
}

/// A filter that passes samples through unchanged.
pub fn identity() -> Box<dyn Filter> {
    Box::new(|_: u16, _: f64, sample: f32| sample)
}

/// Clips to [-1, 1]. Each sign is clamped on its own so an overflow never
/// wraps around to the other side.
#[inline]
pub fn clip(sample: f32) -> f32 {
    if sample >= 0.0 {
        sample.min(1.0)
    } else {
        sample.max(-1.0)
    }
}

/// Converts a clipped sample to 16-bit PCM.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample * f32::from(i16::MAX)) as i16
}

pub struct Mixer {
    channels: u16,
    generator: Box<dyn Generator>,
    filter: Box<dyn Filter>,
}

impl Mixer {
    pub fn new(channels: u16, generator: Box<dyn Generator>, filter: Box<dyn Filter>) -> Self {
        Self {
            channels,
            generator,
            filter,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Renders one frame into `frame` (one value per channel) and returns how
    /// many voices finished and were removed.
    ///
    /// Every voice advances once per frame no matter how many channels there
    /// are. A voice's first frame is sample frame 0; it moves forward after
    /// each read. A looping voice that reaches its end starts over in the same
    /// frame, so it is never missing from `voices`.
    pub fn render_frame(
        &mut self,
        voices: &mut Vec<Voice>,
        global_time: f64,
        time_step: f64,
        frame: &mut [f32],
    ) -> usize {
        frame.fill(0.0);

        let mut retired = 0;
        voices.retain_mut(|voice| {
            voice.mix_into(frame, time_step);
            if !voice.is_finished() {
                return true;
            }
            if voice.is_looping() {
                voice.restart();
                return true;
            }
            retired += 1;
            false
        });

        for (channel, cell) in (0..self.channels).zip(frame.iter_mut()) {
            let mixed = *cell + self.generator.generate(channel, global_time, time_step);
            *cell = clip(self.filter.filter(channel, global_time, mixed));
        }

        retired
    }
}
