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

use serde::{Deserialize, Serialize};

pub mod preset;

pub use preset::{Envelope, Preset, PresetLibrary};

/// Default flash fade length in seconds.
pub const DEFAULT_FLASH_FADE_SECS: f64 = 0.25;

/// Default strobe rate in toggles per second.
pub const DEFAULT_STROBE_RATE: f64 = 10.0;

/// Default duration for effects that are not open ended.
pub const DEFAULT_EFFECT_SECS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown effect '{0}'")]
pub struct UnknownEffect(pub String);

/// The names an effect can be referred to by. Fixtures list the kinds they
/// support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Set,
    Flash,
    Strobe,
    Fade,
    Full,
    Seek,
    Preset,
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Set,
        EffectKind::Flash,
        EffectKind::Strobe,
        EffectKind::Fade,
        EffectKind::Full,
        EffectKind::Seek,
        EffectKind::Preset,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Set => "set",
            EffectKind::Flash => "flash",
            EffectKind::Strobe => "strobe",
            EffectKind::Fade => "fade",
            EffectKind::Full => "full",
            EffectKind::Seek => "seek",
            EffectKind::Preset => "preset",
        }
    }

    /// Visible effects always arm the fixture for their span.
    pub fn arms_fixture(&self) -> bool {
        matches!(
            self,
            EffectKind::Flash | EffectKind::Strobe | EffectKind::Full | EffectKind::Preset
        )
    }
}

impl FromStr for EffectKind {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEffect(s.to_string()))
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A channel value as written in an action: a normalized level, or a label
/// looked up in the fixture's value mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Level(f64),
    Label(String),
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Level(level) => write!(f, "{}", level),
            ChannelValue::Label(label) => f.write_str(label),
        }
    }
}

/// An effect and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Hold a channel at a value.
    Set { channel: String, value: ChannelValue },

    /// Jump the emissive channels to full, then fade them out.
    Flash {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fade_seconds: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fade_beats: Option<f64>,
    },

    /// Toggle a channel (or every emissive channel) between 0 and full.
    Strobe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        rate: f64,
    },

    /// Linear ramp between two values.
    Fade {
        channel: String,
        from: ChannelValue,
        to: ChannelValue,
    },

    /// Arm and drive every emissive channel to full.
    Full,

    /// Move to a raw pan/tilt position, clamped to the fixture's limits.
    Seek {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pan: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tilt: Option<u16>,
    },

    /// Play a named ADSR preset.
    Preset { name: String },
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Set { .. } => EffectKind::Set,
            Effect::Flash { .. } => EffectKind::Flash,
            Effect::Strobe { .. } => EffectKind::Strobe,
            Effect::Fade { .. } => EffectKind::Fade,
            Effect::Full => EffectKind::Full,
            Effect::Seek { .. } => EffectKind::Seek,
            Effect::Preset { .. } => EffectKind::Preset,
        }
    }

    /// Builds an effect that needs no parameters beyond its name. Effects
    /// that need a channel or target have no defaults.
    pub fn with_defaults(kind: EffectKind) -> Option<Effect> {
        match kind {
            EffectKind::Flash => Some(Effect::Flash {
                fade_seconds: None,
                fade_beats: None,
            }),
            EffectKind::Strobe => Some(Effect::Strobe {
                channel: None,
                rate: DEFAULT_STROBE_RATE,
            }),
            EffectKind::Full => Some(Effect::Full),
            EffectKind::Set | EffectKind::Fade | EffectKind::Seek | EffectKind::Preset => None,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Set { channel, value } => write!(f, "set {} to {}", channel, value),
            Effect::Flash { .. } => f.write_str("flash"),
            Effect::Strobe { channel, rate } => match channel {
                Some(channel) => write!(f, "strobe {} at {}hz", channel, rate),
                None => write!(f, "strobe at {}hz", rate),
            },
            Effect::Fade { channel, from, to } => {
                write!(f, "fade {} from {} to {}", channel, from, to)
            }
            Effect::Full => f.write_str("full"),
            Effect::Seek { pan, tilt } => write!(f, "seek pan {:?} tilt {:?}", pan, tilt),
            Effect::Preset { name } => write!(f, "preset {}", name),
        }
    }
}
