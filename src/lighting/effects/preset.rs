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

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("unable to read presets from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed presets in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yml::Error,
    },
    #[error("preset '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

fn default_hold() -> f64 {
    1.0
}

/// An attack/decay/sustain/release envelope over a normalized 0..1 intensity.
/// Times are in seconds, `sustain` is a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    /// How long to sustain when the action gives no duration.
    #[serde(default = "default_hold")]
    pub hold: f64,
}

/// One segment of an envelope, relative to the action start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub offset: f64,
    pub length: f64,
    pub from: f64,
    pub to: f64,
}

impl Envelope {
    /// The natural length of the envelope.
    pub fn default_duration(&self) -> f64 {
        self.attack + self.decay + self.hold + self.release
    }

    /// Lays the envelope out over `duration` seconds. When the duration is too
    /// short for attack, decay and release, all three are scaled down to fit
    /// and there is no sustain.
    pub fn phases(&self, duration: f64) -> [Phase; 4] {
        let ramps = self.attack + self.decay + self.release;
        let (scale, sustain_time) = if ramps > duration && ramps > 0.0 {
            (duration / ramps, 0.0)
        } else {
            (1.0, duration - ramps)
        };
        let attack = self.attack * scale;
        let decay = self.decay * scale;
        let release = self.release * scale;

        [
            Phase {
                offset: 0.0,
                length: attack,
                from: 0.0,
                to: 1.0,
            },
            Phase {
                offset: attack,
                length: decay,
                from: 1.0,
                to: self.sustain,
            },
            Phase {
                offset: attack + decay,
                length: sustain_time,
                from: self.sustain,
                to: self.sustain,
            },
            Phase {
                offset: attack + decay + sustain_time,
                length: release,
                from: self.sustain,
                to: 0.0,
            },
        ]
    }

    fn validate(&self, name: &str) -> Result<(), PresetError> {
        let invalid = |reason: String| PresetError::Invalid {
            name: name.to_string(),
            reason,
        };
        for (field, value) in [
            ("attack", self.attack),
            ("decay", self.decay),
            ("release", self.release),
            ("hold", self.hold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} must be a non-negative time", field)));
            }
        }
        if !(0.0..=1.0).contains(&self.sustain) {
            return Err(invalid("sustain must be a level in 0.0-1.0".to_string()));
        }
        Ok(())
    }
}

/// An envelope applied to a weighted set of channels, e.g. red 1.0, green
/// 0.65, blue 0.0 for an amber swell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub weights: BTreeMap<String, f64>,
}

impl Preset {
    fn validate(&self, name: &str) -> Result<(), PresetError> {
        self.envelope.validate(name)?;
        if self.weights.is_empty() {
            return Err(PresetError::Invalid {
                name: name.to_string(),
                reason: "no channel weights".to_string(),
            });
        }
        if let Some((channel, _)) = self
            .weights
            .iter()
            .find(|(_, weight)| !(0.0..=1.0).contains(*weight))
        {
            return Err(PresetError::Invalid {
                name: name.to_string(),
                reason: format!("weight for '{}' must be in 0.0-1.0", channel),
            });
        }
        Ok(())
    }
}

/// Named presets available to `preset` actions.
#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    presets: BTreeMap<String, Preset>,
}

impl PresetLibrary {
    /// The presets that ship with the engine.
    pub fn builtin() -> PresetLibrary {
        let preset = |attack, decay, sustain, release, hold, weights: &[(&str, f64)]| Preset {
            envelope: Envelope {
                attack,
                decay,
                sustain,
                release,
                hold,
            },
            weights: weights
                .iter()
                .map(|(channel, weight)| (channel.to_string(), *weight))
                .collect(),
        };

        let mut presets = BTreeMap::new();
        presets.insert(
            "amber_swell".to_string(),
            preset(
                0.5,
                0.25,
                0.7,
                0.75,
                1.0,
                &[("red", 1.0), ("green", 0.65), ("blue", 0.0)],
            ),
        );
        presets.insert(
            "cool_pulse".to_string(),
            preset(
                0.05,
                0.2,
                0.4,
                0.3,
                0.25,
                &[("red", 0.0), ("green", 0.35), ("blue", 1.0)],
            ),
        );
        presets.insert(
            "white_hit".to_string(),
            preset(
                0.0,
                0.15,
                0.5,
                0.5,
                0.5,
                &[("red", 1.0), ("green", 1.0), ("blue", 1.0), ("white", 1.0)],
            ),
        );
        PresetLibrary { presets }
    }

    /// Parses a YAML map of preset name to preset.
    pub fn from_yaml(path: &Path, content: &str) -> Result<PresetLibrary, PresetError> {
        let presets: BTreeMap<String, Preset> =
            serde_yml::from_str(content).map_err(|source| PresetError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        for (name, preset) in &presets {
            preset.validate(name)?;
        }
        Ok(PresetLibrary { presets })
    }

    /// Loads a YAML preset file.
    pub fn load(path: &Path) -> Result<PresetLibrary, PresetError> {
        let content = fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let library = Self::from_yaml(path, &content)?;
        info!(
            path = %path.display(),
            count = library.presets.len(),
            "Loaded lighting presets."
        );
        Ok(library)
    }

    /// Adds a single preset, replacing any with the same name.
    pub fn insert(&mut self, name: &str, preset: Preset) -> Result<(), PresetError> {
        preset.validate(name)?;
        self.presets.insert(name.to_string(), preset);
        Ok(())
    }

    /// Adds the other library's presets, replacing any with the same name.
    pub fn extend(&mut self, other: PresetLibrary) {
        self.presets.extend(other.presets);
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}
