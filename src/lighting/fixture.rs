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

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::effects::EffectKind;
use crate::dmx::universe::{slot, FINE_MAX};

const MSB_SUFFIX: &str = "_msb";
const LSB_SUFFIX: &str = "_lsb";

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("unable to read fixture definitions from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed fixture definitions in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("fixture '{0}' is defined more than once")]
    DuplicateId(String),
    #[error("unknown fixture '{0}'")]
    UnknownFixture(String),
    #[error("fixture '{fixture}' has no channel '{channel}'")]
    UnknownChannel { fixture: String, channel: String },
    #[error("fixture '{fixture}' maps channel '{channel}' to address {address}, outside of 1-512")]
    AddressOutOfRange {
        fixture: String,
        channel: String,
        address: u32,
    },
    #[error("fixture '{fixture}' maps both '{first}' and '{second}' to address {address}")]
    SharedAddress {
        fixture: String,
        first: String,
        second: String,
        address: u16,
    },
    #[error("fixture '{fixture}' has only one half of the 16-bit channel '{channel}'")]
    IncompletePair { fixture: String, channel: String },
    #[error("fixture '{fixture}' lists unknown effect '{effect}'")]
    UnknownEffect { fixture: String, effect: String },
    #[error("fixture '{fixture}' arm value {value} is outside of 0-255")]
    ArmValue { fixture: String, value: i64 },
    #[error("fixture '{fixture}' arm channel '{channel}' must be a single 8-bit channel")]
    ArmNotCoarse { fixture: String, channel: String },
    #[error("fixture '{fixture}' position constraint on '{channel}' is invalid ({min}..{max})")]
    Constraint {
        fixture: String,
        channel: String,
        min: i64,
        max: i64,
    },
    #[error("fixture '{fixture}' maps '{value}' on '{channel}', which is not a DMX value")]
    MappingValue {
        fixture: String,
        channel: String,
        value: String,
    },
    #[error("fixture '{0}' supports seek but has no pan and tilt channels")]
    SeekWithoutPosition(String),
}

/// A fixture definition exactly as it appears on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawFixture {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub fixture_type: String,
    pub channels: BTreeMap<String, u32>,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub arm: Option<RawArm>,
    #[serde(default)]
    pub meta: RawMeta,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawArm {
    pub channel: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMeta {
    #[serde(default)]
    pub channel_types: BTreeMap<String, ChannelKind>,
    /// Channel name to (DMX value to label).
    #[serde(default)]
    pub value_mappings: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub position_constraints: BTreeMap<String, RawConstraint>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConstraint {
    pub min: i64,
    pub max: i64,
}

/// Where the fixture hangs. Informational only.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub label: Option<String>,
}

/// What a channel controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[serde(alias = "dimmer")]
    Intensity,
    Color,
    Position,
    Wheel,
    Strobe,
    #[serde(other)]
    Other,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelKind::Intensity => "intensity",
            ChannelKind::Color => "color",
            ChannelKind::Position => "position",
            ChannelKind::Wheel => "wheel",
            ChannelKind::Strobe => "strobe",
            ChannelKind::Other => "other",
        })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)?;
        if let Some(label) = &self.label {
            write!(f, " {}", label)?;
        }
        Ok(())
    }
}

impl ChannelKind {
    /// Guesses the channel kind from a conventional channel name.
    pub fn infer(name: &str) -> ChannelKind {
        match name {
            "dim" | "dimmer" | "intensity" | "master" => ChannelKind::Intensity,
            "red" | "green" | "blue" | "white" | "amber" | "uv" | "lime" | "cyan" | "magenta"
            | "yellow" => ChannelKind::Color,
            "pan" | "tilt" => ChannelKind::Position,
            "strobe" | "shutter" => ChannelKind::Strobe,
            _ if name.contains("wheel") || name.contains("gobo") || name == "color" => {
                ChannelKind::Wheel
            }
            _ => ChannelKind::Other,
        }
    }

    /// True for channels that emit light directly.
    pub fn is_emissive(&self) -> bool {
        matches!(self, ChannelKind::Intensity | ChannelKind::Color)
    }
}

/// A logical channel resolved to DMX addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedChannel {
    /// A single 8-bit channel.
    Coarse(u16),
    /// One 16-bit value split over two channels.
    Fine { msb: u16, lsb: u16 },
}

impl ResolvedChannel {
    /// The largest raw value this channel can carry.
    pub fn max_raw(&self) -> u16 {
        match self {
            ResolvedChannel::Coarse(_) => u16::from(u8::MAX),
            ResolvedChannel::Fine { .. } => FINE_MAX,
        }
    }
}

/// The arm precondition: the channel and value that make the fixture visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm {
    pub channel: String,
    pub address: u16,
    pub value: u8,
}

/// Inclusive raw-value bounds for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub min: u16,
    pub max: u16,
}

impl Constraint {
    pub fn clamp(&self, value: u16) -> u16 {
        value.clamp(self.min, self.max)
    }
}

/// A validated, immutable fixture definition.
#[derive(Debug, Clone)]
pub struct FixtureDefinition {
    id: String,
    name: String,
    fixture_type: String,
    addresses: BTreeMap<String, u16>,
    logical: BTreeMap<String, ResolvedChannel>,
    kinds: BTreeMap<String, ChannelKind>,
    effects: BTreeSet<EffectKind>,
    arm: Option<Arm>,
    value_mappings: BTreeMap<String, BTreeMap<u8, String>>,
    constraints: BTreeMap<String, Constraint>,
    position: Option<Position>,
}

impl FixtureDefinition {
    /// Validates a raw definition. Anything malformed is rejected here so that
    /// rendering never has to second guess a fixture.
    pub fn from_raw(raw: RawFixture) -> Result<FixtureDefinition, FixtureError> {
        let id = raw.id;

        let mut addresses = BTreeMap::new();
        let mut by_address: BTreeMap<u16, String> = BTreeMap::new();
        for (channel, address) in raw.channels {
            let address = u16::try_from(address)
                .ok()
                .filter(|address| slot(*address).is_some())
                .ok_or_else(|| FixtureError::AddressOutOfRange {
                    fixture: id.clone(),
                    channel: channel.clone(),
                    address,
                })?;
            if let Some(first) = by_address.insert(address, channel.clone()) {
                return Err(FixtureError::SharedAddress {
                    fixture: id.clone(),
                    first,
                    second: channel,
                    address,
                });
            }
            addresses.insert(channel, address);
        }

        let logical = resolve_logical(&id, &addresses)?;

        let kinds = logical
            .keys()
            .map(|name| {
                let kind = raw
                    .meta
                    .channel_types
                    .get(name)
                    .or_else(|| raw.meta.channel_types.get(&format!("{}{}", name, MSB_SUFFIX)))
                    .copied()
                    .unwrap_or_else(|| ChannelKind::infer(name));
                (name.clone(), kind)
            })
            .collect();

        let effects = raw
            .effects
            .iter()
            .map(|effect| {
                effect
                    .parse::<EffectKind>()
                    .map_err(|_| FixtureError::UnknownEffect {
                        fixture: id.clone(),
                        effect: effect.clone(),
                    })
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let arm = raw
            .arm
            .map(|arm| {
                let value = u8::try_from(arm.value).map_err(|_| FixtureError::ArmValue {
                    fixture: id.clone(),
                    value: arm.value,
                })?;
                match logical.get(&arm.channel) {
                    Some(ResolvedChannel::Coarse(address)) => Ok(Arm {
                        channel: arm.channel,
                        address: *address,
                        value,
                    }),
                    Some(ResolvedChannel::Fine { .. }) => Err(FixtureError::ArmNotCoarse {
                        fixture: id.clone(),
                        channel: arm.channel,
                    }),
                    None => Err(FixtureError::UnknownChannel {
                        fixture: id.clone(),
                        channel: arm.channel,
                    }),
                }
            })
            .transpose()?;

        let mut value_mappings = BTreeMap::new();
        for (channel, mappings) in raw.meta.value_mappings {
            if !logical.contains_key(&channel) {
                return Err(FixtureError::UnknownChannel {
                    fixture: id.clone(),
                    channel,
                });
            }
            let mut parsed = BTreeMap::new();
            for (value, label) in mappings {
                let raw_value =
                    value
                        .trim()
                        .parse::<u8>()
                        .map_err(|_| FixtureError::MappingValue {
                            fixture: id.clone(),
                            channel: channel.clone(),
                            value: value.clone(),
                        })?;
                parsed.insert(raw_value, label);
            }
            value_mappings.insert(channel, parsed);
        }

        let mut constraints = BTreeMap::new();
        for (channel, constraint) in raw.meta.position_constraints {
            let resolved = logical
                .get(&channel)
                .ok_or_else(|| FixtureError::UnknownChannel {
                    fixture: id.clone(),
                    channel: channel.clone(),
                })?;
            let max_raw = i64::from(resolved.max_raw());
            if constraint.min < 0 || constraint.max > max_raw || constraint.min > constraint.max
            {
                return Err(FixtureError::Constraint {
                    fixture: id.clone(),
                    channel,
                    min: constraint.min,
                    max: constraint.max,
                });
            }
            constraints.insert(
                channel,
                Constraint {
                    min: constraint.min as u16,
                    max: constraint.max as u16,
                },
            );
        }

        if effects.contains(&EffectKind::Seek)
            && !(logical.contains_key("pan") && logical.contains_key("tilt"))
        {
            return Err(FixtureError::SeekWithoutPosition(id));
        }

        Ok(FixtureDefinition {
            name: raw.name.unwrap_or_else(|| id.clone()),
            id,
            fixture_type: raw.fixture_type,
            addresses,
            logical,
            kinds,
            effects,
            arm,
            value_mappings,
            constraints,
            position: raw.position,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fixture_type(&self) -> &str {
        &self.fixture_type
    }

    /// The physical channel map, name to 1-based DMX address.
    pub fn addresses(&self) -> &BTreeMap<String, u16> {
        &self.addresses
    }

    pub fn arm(&self) -> Option<&Arm> {
        self.arm.as_ref()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn supports(&self, effect: EffectKind) -> bool {
        self.effects.contains(&effect)
    }

    pub fn effects(&self) -> impl Iterator<Item = EffectKind> + '_ {
        self.effects.iter().copied()
    }

    /// Resolves a logical channel name. `pan` resolves to the `pan_msb`/`pan_lsb`
    /// pair when the fixture splits it.
    pub fn resolve(&self, channel: &str) -> Result<ResolvedChannel, FixtureError> {
        self.logical
            .get(channel)
            .copied()
            .ok_or_else(|| FixtureError::UnknownChannel {
                fixture: self.id.clone(),
                channel: channel.to_string(),
            })
    }

    /// The kind of a logical channel. Either half of an `x_msb`/`x_lsb` pair reports the
    /// kind of `x`.
    pub fn kind(&self, channel: &str) -> Option<ChannelKind> {
        let logical = channel
            .strip_suffix(MSB_SUFFIX)
            .or_else(|| channel.strip_suffix(LSB_SUFFIX))
            .filter(|logical| self.kinds.contains_key(*logical))
            .unwrap_or(channel);
        self.kinds.get(logical).copied()
    }

    /// Channels that emit light, excluding the arm channel, in name order.
    pub fn emissive_channels(&self) -> Vec<(&str, ResolvedChannel)> {
        let arm = self.arm.as_ref().map(|arm| arm.channel.as_str());
        self.logical
            .iter()
            .filter(|(name, _)| Some(name.as_str()) != arm)
            .filter(|(name, _)| self.kinds.get(*name).is_some_and(ChannelKind::is_emissive))
            .map(|(name, resolved)| (name.as_str(), *resolved))
            .collect()
    }

    /// Looks up the raw value for a symbolic label such as a color wheel slot.
    pub fn mapped_value(&self, channel: &str, label: &str) -> Option<u8> {
        self.value_mappings.get(channel).and_then(|mappings| {
            mappings
                .iter()
                .find(|(_, candidate)| candidate.eq_ignore_ascii_case(label))
                .map(|(value, _)| *value)
        })
    }

    /// Looks up the label of a raw value.
    pub fn value_label(&self, channel: &str, value: u8) -> Option<&str> {
        self.value_mappings
            .get(channel)
            .and_then(|mappings| mappings.get(&value))
            .map(String::as_str)
    }

    pub fn constraint(&self, channel: &str) -> Option<Constraint> {
        self.constraints.get(channel).copied()
    }
}

impl fmt::Display for FixtureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let effects: Vec<&str> = self.effects.iter().map(EffectKind::name).collect();
        write!(
            f,
            "{} ({}, {}): channels {}, effects [{}]",
            self.id,
            self.name,
            self.fixture_type,
            self.addresses
                .iter()
                .map(|(name, address)| format!("{}@{}", name, address))
                .collect::<Vec<_>>()
                .join(" "),
            effects.join(", ")
        )
    }
}

/// Collapses `x_msb`/`x_lsb` pairs into a single logical `x`.
fn resolve_logical(
    fixture: &str,
    addresses: &BTreeMap<String, u16>,
) -> Result<BTreeMap<String, ResolvedChannel>, FixtureError> {
    let mut logical = BTreeMap::new();
    for (name, address) in addresses {
        if let Some(base) = name.strip_suffix(MSB_SUFFIX) {
            let lsb = addresses
                .get(&format!("{}{}", base, LSB_SUFFIX))
                .ok_or_else(|| FixtureError::IncompletePair {
                    fixture: fixture.to_string(),
                    channel: base.to_string(),
                })?;
            logical.insert(
                base.to_string(),
                ResolvedChannel::Fine {
                    msb: *address,
                    lsb: *lsb,
                },
            );
        } else if let Some(base) = name.strip_suffix(LSB_SUFFIX) {
            if !addresses.contains_key(&format!("{}{}", base, MSB_SUFFIX)) {
                return Err(FixtureError::IncompletePair {
                    fixture: fixture.to_string(),
                    channel: base.to_string(),
                });
            }
        } else {
            logical.insert(name.clone(), ResolvedChannel::Coarse(*address));
        }
    }
    Ok(logical)
}
