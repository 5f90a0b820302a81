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

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, span, Level};

use super::artnet::{DmxSender, SendOutcome, TransportError};
use super::thread_priority;
use super::universe::{Universe, TARGET_HZ};
use crate::lighting::canvas::CanvasHandle;
use crate::playsync::{CancelHandle, PlaybackState};

/// Transport errors are logged once and then every this many consecutive failures.
const ERROR_LOG_INTERVAL: u64 = 44;

/// The tail of each tick wait that is spun rather than parked on the cancel handle.
const SPIN_WINDOW: Duration = Duration::from_millis(2);

/// How the dispatcher ticks and what it sends while idle.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSettings {
    pub fps: f64,
    pub blackout_when_not_playing: bool,
    pub thread_priority: Option<u8>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        DispatcherSettings {
            fps: TARGET_HZ,
            blackout_when_not_playing: false,
            thread_priority: None,
        }
    }
}

/// Streams canvas frames to a sender at a fixed rate for as long as it lives.
pub struct Dispatcher {
    cancel_handle: CancelHandle,
    join_handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Starts the tick thread.
    pub fn start<S>(
        settings: DispatcherSettings,
        canvas: CanvasHandle,
        playback: PlaybackState,
        sender: S,
    ) -> Result<Dispatcher, TransportError>
    where
        S: DmxSender + 'static,
    {
        if !settings.fps.is_finite() || settings.fps <= 0.0 {
            return Err(TransportError::Configure(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("dispatcher fps must be positive, got {}", settings.fps),
            )));
        }

        let cancel_handle = CancelHandle::new();
        let join_handle = {
            let cancel_handle = cancel_handle.clone();
            thread::Builder::new()
                .name("dmx-dispatcher".to_string())
                .spawn(move || {
                    let mut ticker = Ticker {
                        canvas,
                        playback,
                        sender,
                        blackout_when_not_playing: settings.blackout_when_not_playing,
                        failures: 0,
                    };
                    ticker.run(settings.fps, settings.thread_priority, cancel_handle);
                })
                .map_err(TransportError::Configure)?
        };

        Ok(Dispatcher {
            cancel_handle,
            join_handle: Some(join_handle),
        })
    }

    /// Stops the tick thread and waits for it to exit.
    pub fn stop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                error!("DMX dispatcher thread panicked.");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Ticker<S> {
    canvas: CanvasHandle,
    playback: PlaybackState,
    sender: S,
    blackout_when_not_playing: bool,
    failures: u64,
}

impl<S: DmxSender> Ticker<S> {
    fn run(&mut self, fps: f64, priority: Option<u8>, cancel_handle: CancelHandle) {
        let span = span!(Level::INFO, "dmx dispatcher", fps);
        let _enter = span.enter();

        if let Some(priority) = priority {
            thread_priority::raise_current_thread_priority(priority);
        }
        info!("Dispatcher started.");

        let tick_duration = Duration::from_secs(1).div_f64(fps);
        let mut deadline = Instant::now();
        while !cancel_handle.is_cancelled() {
            self.tick();

            // The deadline advances on its own clock so late ticks don't accumulate drift.
            deadline += tick_duration;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining > SPIN_WINDOW && cancel_handle.wait_timeout(remaining - SPIN_WINDOW) {
                break;
            }
            spin_sleep::sleep(deadline.saturating_duration_since(Instant::now()));
        }
        info!("Dispatcher stopped.");
    }

    fn tick(&mut self) {
        let playback = self.playback.snapshot();
        let universe = if playback.is_playing {
            self.canvas.read().get_frame(playback.current_time)
        } else if self.blackout_when_not_playing {
            Universe::blackout()
        } else {
            return;
        };

        match self.sender.send(&universe) {
            Ok(SendOutcome::Sent) | Ok(SendOutcome::Dropped) => {
                if self.failures > 0 {
                    info!(failures = self.failures, "DMX output recovered.");
                }
                self.failures = 0;
            }
            Err(e) => {
                self.failures += 1;
                if self.failures == 1 || self.failures % ERROR_LOG_INTERVAL == 0 {
                    error!(err = %e, failures = self.failures, "Error sending DMX frame.");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmx::artnet::MockSender;
    use crate::lighting::canvas::Canvas;
    use crate::playsync::SyncEvent;
    use crate::testutil::eventually;

    fn settings(blackout_when_not_playing: bool) -> DispatcherSettings {
        DispatcherSettings {
            blackout_when_not_playing,
            ..Default::default()
        }
    }

    fn canvas() -> CanvasHandle {
        Canvas::new(44.0, 10.0).unwrap().into_handle()
    }

    #[test]
    fn test_idle_sends_nothing() {
        let sender = MockSender::new();
        let mut dispatcher = Dispatcher::start(
            settings(false),
            canvas(),
            PlaybackState::new(),
            sender.clone(),
        )
        .unwrap();

        thread::sleep(Duration::from_secs(1));
        dispatcher.stop();
        assert_eq!(sender.count(), 0);
    }

    #[test]
    fn test_idle_blackout() {
        let sender = MockSender::new();
        let mut dispatcher = Dispatcher::start(
            settings(true),
            canvas(),
            PlaybackState::new(),
            sender.clone(),
        )
        .unwrap();

        thread::sleep(Duration::from_secs(1));
        dispatcher.stop();
        let count = sender.count();
        assert!((30..=50).contains(&count), "sent {} packets", count);
        assert!(sender.sent.lock().iter().all(Universe::is_blackout));
    }

    #[test]
    fn test_playing_samples_canvas() {
        let canvas = canvas();
        canvas.write().paint_range(2.0, 10.0, &[(7, 77)]).unwrap();
        let playback = PlaybackState::new();
        let sender = MockSender::new();
        let mut dispatcher = Dispatcher::start(
            settings(false),
            canvas.clone(),
            playback.clone(),
            sender.clone(),
        )
        .unwrap();

        playback.apply(SyncEvent {
            is_playing: true,
            current_time: 3.0,
        });
        eventually(
            || sender.last().and_then(|u| u.channel(7)) == Some(77),
            "dispatcher never sent the painted frame",
        );

        playback.apply(SyncEvent {
            is_playing: false,
            current_time: 3.0,
        });
        thread::sleep(Duration::from_millis(100));
        let count = sender.count();
        thread::sleep(Duration::from_millis(200));
        dispatcher.stop();
        assert_eq!(sender.count(), count);
    }

    #[test]
    fn test_send_errors_do_not_stop_loop() {
        let canvas = canvas();
        let playback = PlaybackState::new();
        playback.apply(SyncEvent {
            is_playing: true,
            current_time: 0.0,
        });
        let mut ticker = Ticker {
            canvas,
            playback,
            sender: MockSender::failing(),
            blackout_when_not_playing: false,
            failures: 0,
        };
        for _ in 0..100 {
            ticker.tick();
        }
        assert_eq!(ticker.failures, 100);
    }

    #[test]
    fn test_rejects_bad_fps() {
        let result = Dispatcher::start(
            DispatcherSettings {
                fps: 0.0,
                ..Default::default()
            },
            canvas(),
            PlaybackState::new(),
            MockSender::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_stop_is_prompt() {
        let mut dispatcher = Dispatcher::start(
            settings(true),
            canvas(),
            PlaybackState::new(),
            MockSender::new(),
        )
        .unwrap();
        let start = Instant::now();
        dispatcher.stop();
        dispatcher.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_stop_wakes_a_slow_tick() {
        let sender = MockSender::new();
        let mut dispatcher = Dispatcher::start(
            DispatcherSettings {
                fps: 0.1,
                ..settings(true)
            },
            canvas(),
            PlaybackState::new(),
            sender.clone(),
        )
        .unwrap();
        eventually(|| sender.count() == 1, "dispatcher never sent its first frame");

        // The next tick is ten seconds away.
        let start = Instant::now();
        dispatcher.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(sender.count(), 1);
    }
}
