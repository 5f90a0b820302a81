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

use std::fmt;

/// A DMX universe is 512 channels.
pub const UNIVERSE_SIZE: usize = 512;

/// The target number of updates per second.
pub const TARGET_HZ: f64 = 44.0;

/// The largest value a 16-bit (coarse + fine) channel pair can carry.
pub const FINE_MAX: u16 = u16::MAX;

/// Raised when a normalized level cannot be represented on a channel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("level {0} is outside of 0.0-1.0")]
    LevelOutOfRange(f64),
    #[error("DMX address {0} is outside of 1-512")]
    AddressOutOfRange(u16),
}

/// One snapshot of all 512 channel values. Index 0 holds DMX address 1.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Universe([u8; UNIVERSE_SIZE]);

impl Universe {
    /// An all-zero universe.
    pub const fn blackout() -> Universe {
        Universe([0; UNIVERSE_SIZE])
    }

    /// Gets the value at the given 1-based DMX address.
    pub fn channel(&self, address: u16) -> Option<u8> {
        slot(address).map(|index| self.0[index])
    }

    /// Sets the value at the given 1-based DMX address.
    pub fn set_channel(&mut self, address: u16, value: u8) -> Result<(), ValueError> {
        let index = slot(address).ok_or(ValueError::AddressOutOfRange(address))?;
        self.0[index] = value;
        Ok(())
    }

    /// Sets a 0-based slot from `slot`. Panics if the index is out of bounds.
    pub(crate) fn set_slot(&mut self, index: usize, value: u8) {
        self.0[index] = value;
    }

    /// Zeroes every channel.
    pub fn clear(&mut self) {
        self.0.fill(0);
    }

    /// Returns true if every channel is zero.
    pub fn is_blackout(&self) -> bool {
        self.0.iter().all(|value| *value == 0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Universe {
    fn default() -> Self {
        Universe::blackout()
    }
}

impl fmt::Debug for Universe {
    // Only the lit channels, a full dump is unreadable in test failures.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.0
                    .iter()
                    .enumerate()
                    .filter(|(_, value)| **value > 0)
                    .map(|(index, value)| (index + 1, value)),
            )
            .finish()
    }
}

/// Converts a 1-based DMX address into a buffer index.
pub fn slot(address: u16) -> Option<usize> {
    if (1..=UNIVERSE_SIZE as u16).contains(&address) {
        Some(usize::from(address - 1))
    } else {
        None
    }
}

/// Checks that a normalized level lies in 0.0-1.0.
pub fn check_level(level: f64) -> Result<f64, ValueError> {
    if (0.0..=1.0).contains(&level) {
        Ok(level)
    } else {
        Err(ValueError::LevelOutOfRange(level))
    }
}

/// Converts a normalized level to a DMX byte, rounding to the nearest value.
pub fn level_to_dmx(level: f64) -> Result<u8, ValueError> {
    Ok((check_level(level)? * f64::from(u8::MAX)).round() as u8)
}

/// Converts a DMX byte back to a normalized level.
pub fn dmx_to_level(value: u8) -> f64 {
    f64::from(value) / f64::from(u8::MAX)
}

/// Converts a normalized level to a 16-bit value split into (coarse, fine) bytes.
pub fn level_to_fine(level: f64) -> Result<(u8, u8), ValueError> {
    let value = (check_level(level)? * f64::from(FINE_MAX)).round() as u16;
    Ok(split_fine(value))
}

/// Splits a 16-bit value into (coarse, fine) bytes.
pub fn split_fine(value: u16) -> (u8, u8) {
    let [msb, lsb] = value.to_be_bytes();
    (msb, lsb)
}

/// Joins (coarse, fine) bytes into a 16-bit value.
pub fn join_fine(msb: u8, lsb: u8) -> u16 {
    u16::from_be_bytes([msb, lsb])
}
