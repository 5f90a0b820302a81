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
use tracing::{info, warn};

/// Priorities run 0-99, matching the crossplatform range.
pub const MAX_PRIORITY: u8 = 99;

/// Converts a configured priority, rejecting anything out of range.
pub fn priority_value(priority: u8) -> Option<ThreadPriorityValue> {
    if priority > MAX_PRIORITY {
        return None;
    }
    ThreadPriorityValue::try_from(priority).ok()
}

/// Raises the priority of the calling thread. Failure (usually missing privileges) is logged
/// and otherwise ignored: the dispatcher still runs, just with more jitter.
pub fn raise_current_thread_priority(priority: u8) -> bool {
    let Some(value) = priority_value(priority) else {
        warn!(priority, "Ignoring out of range dispatcher thread priority.");
        return false;
    };
    match set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        Ok(()) => {
            info!(priority, "Raised dispatcher thread priority.");
            true
        }
        Err(e) => {
            warn!(priority, err = ?e, "Unable to raise dispatcher thread priority.");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_range() {
        assert!(priority_value(0).is_some());
        assert!(priority_value(99).is_some());
        assert!(priority_value(100).is_none());
        assert!(!raise_current_thread_priority(150));
    }
}
