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
use std::sync::atomic::{AtomicU64, Ordering};

/// Rendered time in seconds. Only the render thread advances it; anyone may read it.
#[derive(Debug, Default)]
pub struct GlobalClock {
    bits: AtomicU64,
}

impl GlobalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in seconds.
    pub fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Moves the clock forward. Single writer, so load/store is enough.
    pub(crate) fn advance(&self, step: f64) {
        let next = self.now() + step;
        self.bits.store(next.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_at_zero() {
        assert_eq!(GlobalClock::new().now(), 0.0);
    }

    #[test]
    fn test_clock_advances() {
        let clock = GlobalClock::new();
        for _ in 0..4 {
            clock.advance(0.25);
        }
        assert_eq!(clock.now(), 1.0);
    }
}
