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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, info, warn};

use crate::config;

const PRIORITY_ENV: &str = "BLOCKMIX_THREAD_PRIORITY";
const DISABLE_RT_ENV: &str = "BLOCKMIX_DISABLE_RT_AUDIO";

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

fn env_priority() -> Option<u8> {
    std::env::var(PRIORITY_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
}

/// Scheduling requested for the render thread. Resolved once before the
/// thread starts so the environment is never read from the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RenderPriority {
    priority: u8,
    realtime: bool,
}

impl RenderPriority {
    /// Takes the configured values, letting BLOCKMIX_THREAD_PRIORITY and
    /// BLOCKMIX_DISABLE_RT_AUDIO override them.
    pub(crate) fn from_config(config: &config::Engine) -> Self {
        Self::new(
            env_priority().unwrap_or(config.thread_priority()),
            config.realtime() && !env_flag(DISABLE_RT_ENV),
        )
    }

    pub(crate) fn new(priority: u8, realtime: bool) -> Self {
        Self {
            priority: priority.min(99),
            realtime,
        }
    }

    pub(crate) fn priority(&self) -> u8 {
        self.priority
    }

    pub(crate) fn realtime(&self) -> bool {
        self.realtime
    }

    /// Applies the priority to the calling thread. Failures are logged and
    /// otherwise ignored; the engine still works at normal priority.
    pub(crate) fn apply(&self) {
        let Ok(value) = ThreadPriorityValue::try_from(self.priority) else {
            warn!(priority = self.priority, "Invalid render thread priority");
            return;
        };
        let priority = ThreadPriority::Crossplatform(value);
        if let Err(e) = set_current_thread_priority(priority) {
            debug!(error = ?e, "Failed to raise render thread priority");
        }

        #[cfg(unix)]
        if self.realtime {
            use thread_priority::unix::{
                set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
                ThreadSchedulePolicy,
            };
            match set_thread_priority_and_policy(
                thread_native_id(),
                priority,
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            ) {
                Ok(()) => info!(priority = self.priority, "Enabled RT SCHED_FIFO for render thread"),
                Err(e) => warn!(error = ?e, "Failed to set RT SCHED_FIFO for render thread"),
            }
        }
    }
}
