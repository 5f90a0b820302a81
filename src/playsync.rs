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
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Represents the current cancel state.
#[derive(PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is passed to long running loops such as the dispatcher. It's the loop's
/// responsibility to respect a cancel request.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<Mutex<CancelState>>,
    /// The condvar wakes sleepers when the handle is cancelled.
    condvar: Arc<Condvar>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(CancelState::Untouched)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true if the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock() == CancelState::Cancelled
    }

    /// Blocks until the handle is cancelled or the timeout elapses. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        if *cancelled == CancelState::Untouched {
            let _ = self.condvar.wait_for(&mut cancelled, timeout);
        }
        *cancelled == CancelState::Cancelled
    }

    /// Cancel the underlying process.
    pub fn cancel(&self) {
        let mut cancel_state = self.cancelled.lock();
        if *cancel_state == CancelState::Untouched {
            *cancel_state = CancelState::Cancelled;
            self.condvar.notify_all();
        }
    }
}

/// A playback sync event from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub is_playing: bool,
    pub current_time: f64,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    is_playing: bool,
    current_time: f64,
    anchored_at: Instant,
}

/// The shared playback position. Written by sync events, read every dispatcher tick.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    position: Arc<RwLock<Position>>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackState {
    /// A stopped playback state at time zero.
    pub fn new() -> PlaybackState {
        PlaybackState {
            position: Arc::new(RwLock::new(Position {
                is_playing: false,
                current_time: 0.0,
                anchored_at: Instant::now(),
            })),
        }
    }

    /// Applies a sync event. Negative or non-finite times are treated as zero.
    pub fn apply(&self, event: SyncEvent) {
        let current_time = if event.current_time.is_finite() {
            event.current_time.max(0.0)
        } else {
            0.0
        };
        *self.position.write() = Position {
            is_playing: event.is_playing,
            current_time,
            anchored_at: Instant::now(),
        };
        debug!(
            is_playing = event.is_playing,
            current_time, "Playback sync applied."
        );
    }

    pub fn is_playing(&self) -> bool {
        self.position.read().is_playing
    }

    /// The playback position, extrapolated from the last sync event while playing.
    pub fn current_time(&self) -> f64 {
        self.snapshot().current_time
    }

    /// Reads playing state and extrapolated position under one lock.
    pub fn snapshot(&self) -> SyncEvent {
        let position = *self.position.read();
        let current_time = if position.is_playing {
            position.current_time + position.anchored_at.elapsed().as_secs_f64()
        } else {
            position.current_time
        };
        SyncEvent {
            is_playing: position.is_playing,
            current_time,
        }
    }
}
