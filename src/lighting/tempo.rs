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
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeError {
    #[error("'{0}' is not a time (expected e.g. 12.5, 45s, 1m23.45s or 2b)")]
    Malformed(String),
    #[error("'{0}' is given in beats but the song has no BPM")]
    MissingBpm(String),
    #[error("BPM must be positive, got {0}")]
    InvalidBpm(f64),
}

/// A song tempo in beats per minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub fn new(bpm: f64) -> Result<Tempo, TimeError> {
        if bpm.is_finite() && bpm > 0.0 {
            Ok(Tempo { bpm })
        } else {
            Err(TimeError::InvalidBpm(bpm))
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat()
    }
}

/// A time as written in a command, before the tempo is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeLiteral {
    Seconds(f64),
    Beats(f64),
}

impl TimeLiteral {
    /// Resolves to seconds. Beat counts need a tempo.
    pub fn to_seconds(&self, tempo: Option<Tempo>) -> Result<f64, TimeError> {
        match self {
            TimeLiteral::Seconds(seconds) => Ok(*seconds),
            TimeLiteral::Beats(beats) => tempo
                .map(|tempo| tempo.beats_to_seconds(*beats))
                .ok_or_else(|| TimeError::MissingBpm(self.to_string())),
        }
    }
}

impl FromStr for TimeLiteral {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let malformed = || TimeError::Malformed(s.to_string());

        if let Some(beats) = text.strip_suffix('b') {
            return number(beats).map(TimeLiteral::Beats).ok_or_else(malformed);
        }

        let (minutes, rest) = match text.split_once('m') {
            Some((minutes, rest)) => (number(minutes).ok_or_else(malformed)?, rest),
            None => (0.0, text),
        };
        let seconds = match rest.strip_suffix('s') {
            Some(seconds) => number(seconds).ok_or_else(malformed)?,
            // "1m" alone, or plain seconds with no unit.
            None if rest.is_empty() && text.contains('m') => 0.0,
            None if !text.contains('m') => number(rest).ok_or_else(malformed)?,
            None => return Err(malformed()),
        };
        if text.contains('m') && seconds >= 60.0 {
            return Err(malformed());
        }
        Ok(TimeLiteral::Seconds(minutes * 60.0 + seconds))
    }
}

impl fmt::Display for TimeLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeLiteral::Seconds(seconds) => write!(f, "{}s", seconds),
            TimeLiteral::Beats(beats) => write!(f, "{}b", beats),
        }
    }
}

/// Unsigned decimal: digits with an optional fraction.
fn number(text: &str) -> Option<f64> {
    let valid = !text.is_empty()
        && text.chars().all(|c| c.is_ascii_digit() || c == '.')
        && text.chars().filter(|c| *c == '.').count() <= 1
        && text.chars().any(|c| c.is_ascii_digit());
    if !valid {
        return None;
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a time literal into seconds: `12.5`, `45s`, `1m23.45s`, or `2b` (needs a BPM).
pub fn parse_time_literal(text: &str, bpm: Option<f64>) -> Result<f64, TimeError> {
    let literal = text.parse::<TimeLiteral>()?;
    let tempo = bpm.map(Tempo::new).transpose()?;
    literal.to_seconds(tempo)
}
