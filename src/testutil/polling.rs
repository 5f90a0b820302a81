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

use std::thread;
use std::time::{Duration, Instant};

/// How long a condition gets before the test fails. Dispatcher threads tick at
/// 44 Hz, so anything observable shows up well within this.
const TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `condition` with a backoff capped at 50ms until it holds. Panics with
/// `message` once the timeout passes.
pub fn eventually<F>(condition: F, message: &str)
where
    F: Fn() -> bool,
{
    let started = Instant::now();
    let mut backoff = Duration::from_millis(5);
    while !condition() {
        if started.elapsed() > TIMEOUT {
            panic!("{} (waited {:?})", message, started.elapsed());
        }
        thread::sleep(backoff);
        backoff = (backoff * 2).min(Duration::from_millis(50));
    }
}
