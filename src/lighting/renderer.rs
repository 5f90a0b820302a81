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

//! Turns one effect on one fixture into canvas writes.
//!
//! Rendering happens in two steps. [`FixtureRenderer::plan`] resolves channels,
//! values and times into a [`RenderPlan`], failing on anything invalid. Only a
//! complete plan is applied to the canvas, so a rejected action never leaves a
//! partial paint behind.

use tracing::debug;

use super::canvas::{Canvas, CanvasError, ChannelWrite};
use super::effects::{
    ChannelValue, Effect, EffectKind, PresetLibrary, DEFAULT_EFFECT_SECS, DEFAULT_FLASH_FADE_SECS,
};
use super::fixture::{FixtureDefinition, FixtureError, ResolvedChannel};
use super::registry::FixtureRegistry;
use super::tempo::{Tempo, TimeError};
use crate::dmx::universe::{check_level, join_fine, split_fine};

/// Absorbs float noise when deciding which strobe half-period a frame falls in.
const STROBE_EPSILON: f64 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("fixture '{fixture}' does not support {effect}")]
    UnsupportedEffect { fixture: String, effect: EffectKind },
    #[error("fixture '{fixture}' has no value labelled '{label}' on '{channel}'")]
    UnknownLabel {
        fixture: String,
        channel: String,
        label: String,
    },
    #[error("level {level} for '{channel}' is outside of 0.0-1.0")]
    LevelOutOfRange { channel: String, level: f64 },
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
    #[error("preset '{preset}' weights none of the channels on fixture '{fixture}'")]
    NoPresetChannels { fixture: String, preset: String },
    #[error("invalid {effect} parameters: {reason}")]
    InvalidParameter { effect: EffectKind, reason: String },
    #[error("start time {0} must be a non-negative number of seconds")]
    InvalidStart(f64),
    #[error("duration {0} must be a non-negative number of seconds")]
    InvalidDuration(f64),
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// What effects need to know about the song being rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub tempo: Option<Tempo>,
    /// Open ended effects (`set`) run until here.
    pub canvas_end: f64,
}

impl RenderContext {
    pub fn for_canvas(canvas: &Canvas, tempo: Option<Tempo>) -> RenderContext {
        RenderContext {
            tempo,
            canvas_end: canvas.duration(),
        }
    }
}

/// A single resolved canvas write. Values are raw channel units: 0-255 for 8-bit
/// channels, 0-65535 for 16-bit pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintOp {
    /// The same value for every frame in [start, end).
    Hold {
        channel: ResolvedChannel,
        value: u16,
        start: f64,
        end: f64,
    },
    /// A value written into the one frame at `time`.
    Point {
        channel: ResolvedChannel,
        value: u16,
        time: f64,
    },
    /// A linear ramp over [start, start + duration).
    Ramp {
        channel: ResolvedChannel,
        from: u16,
        to: u16,
        start: f64,
        duration: f64,
    },
    /// Alternates between `on` and 0 every 1/rate seconds, starting on.
    Strobe {
        channel: ResolvedChannel,
        on: u16,
        rate: f64,
        start: f64,
        end: f64,
    },
}

/// The validated writes for one action on one fixture.
#[derive(Debug)]
pub struct RenderPlan<'f> {
    fixture: &'f FixtureDefinition,
    ops: Vec<PaintOp>,
}

impl<'f> RenderPlan<'f> {
    pub fn new(fixture: &'f FixtureDefinition) -> RenderPlan<'f> {
        RenderPlan {
            fixture,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[PaintOp] {
        &self.ops
    }

    /// Holds a channel at a value over [start, end). 16-bit channels get both bytes.
    pub fn set_channel_value(
        &mut self,
        channel: &str,
        value: &ChannelValue,
        start: f64,
        end: f64,
    ) -> Result<(), RenderError> {
        check_span(start, end)?;
        let resolved = self.fixture.resolve(channel)?;
        let value = self.raw_value(channel, resolved, value)?;
        self.ops.push(PaintOp::Hold {
            channel: resolved,
            value,
            start,
            end,
        });
        Ok(())
    }

    /// Ramps a channel linearly. A zero duration writes `to` into a single frame.
    pub fn fade_channel(
        &mut self,
        channel: &str,
        from: &ChannelValue,
        to: &ChannelValue,
        start: f64,
        duration: f64,
    ) -> Result<(), RenderError> {
        let resolved = self.fixture.resolve(channel)?;
        let from = self.raw_value(channel, resolved, from)?;
        let to = self.raw_value(channel, resolved, to)?;
        self.ramp(resolved, from, to, start, duration)
    }

    /// Writes the arm channel to its arm value (on) or 0 (off) over [start, end).
    /// Fixtures without an arm channel need nothing.
    pub fn set_arm(&mut self, on: bool, start: f64, end: f64) -> Result<(), RenderError> {
        check_span(start, end)?;
        if let Some(arm) = self.fixture.arm() {
            self.ops.push(PaintOp::Hold {
                channel: ResolvedChannel::Coarse(arm.address),
                value: if on { u16::from(arm.value) } else { 0 },
                start,
                end,
            });
        }
        Ok(())
    }

    fn ramp(
        &mut self,
        channel: ResolvedChannel,
        from: u16,
        to: u16,
        start: f64,
        duration: f64,
    ) -> Result<(), RenderError> {
        check_start(start)?;
        check_duration(duration)?;
        if duration == 0.0 {
            self.ops.push(PaintOp::Point {
                channel,
                value: to,
                time: start,
            });
        } else {
            self.ops.push(PaintOp::Ramp {
                channel,
                from,
                to,
                start,
                duration,
            });
        }
        Ok(())
    }

    fn raw_value(
        &self,
        channel: &str,
        resolved: ResolvedChannel,
        value: &ChannelValue,
    ) -> Result<u16, RenderError> {
        match value {
            ChannelValue::Level(level) => level_to_raw(channel, resolved, *level),
            ChannelValue::Label(label) => {
                let raw = self.fixture.mapped_value(channel, label).ok_or_else(|| {
                    RenderError::UnknownLabel {
                        fixture: self.fixture.id().to_string(),
                        channel: channel.to_string(),
                        label: label.clone(),
                    }
                })?;
                Ok(match resolved {
                    ResolvedChannel::Coarse(_) => u16::from(raw),
                    ResolvedChannel::Fine { .. } => join_fine(raw, 0),
                })
            }
        }
    }

    /// Paints every op. Ops were validated as they were added.
    pub fn apply(&self, canvas: &mut Canvas) -> Result<(), RenderError> {
        for op in &self.ops {
            match *op {
                PaintOp::Hold {
                    channel,
                    value,
                    start,
                    end,
                } => canvas.paint_range(start, end, &writes(channel, value))?,
                PaintOp::Point {
                    channel,
                    value,
                    time,
                } => canvas.paint_frame(time, &writes(channel, value))?,
                PaintOp::Ramp {
                    channel,
                    from,
                    to,
                    start,
                    duration,
                } => {
                    let (from, to) = (f64::from(from), f64::from(to));
                    paint_resolved(canvas, channel, start, start + duration, |t| {
                        let progress = ((t - start) / duration).clamp(0.0, 1.0);
                        (from + (to - from) * progress).round() as u16
                    })?
                }
                PaintOp::Strobe {
                    channel,
                    on,
                    rate,
                    start,
                    end,
                } => paint_resolved(canvas, channel, start, end, |t| {
                    let toggles = ((t - start) * rate + STROBE_EPSILON).floor() as u64;
                    if toggles % 2 == 0 {
                        on
                    } else {
                        0
                    }
                })?,
            }
        }
        Ok(())
    }
}

/// Renders effects using the fixture registry and preset library.
pub struct FixtureRenderer<'a> {
    registry: &'a FixtureRegistry,
    presets: &'a PresetLibrary,
}

impl<'a> FixtureRenderer<'a> {
    pub fn new(registry: &'a FixtureRegistry, presets: &'a PresetLibrary) -> FixtureRenderer<'a> {
        FixtureRenderer { registry, presets }
    }

    pub fn registry(&self) -> &FixtureRegistry {
        self.registry
    }

    pub fn presets(&self) -> &PresetLibrary {
        self.presets
    }

    /// Plans and paints one effect. Nothing is written unless the whole effect is valid.
    pub fn render(
        &self,
        fixture: &str,
        effect: &Effect,
        start: f64,
        duration: Option<f64>,
        context: &RenderContext,
        canvas: &mut Canvas,
    ) -> Result<(), RenderError> {
        let fixture = self.registry.get(fixture)?;
        let plan = self.plan(&fixture, effect, start, duration, context)?;
        plan.apply(canvas)?;
        debug!(
            fixture = fixture.id(),
            effect = %effect,
            start,
            ops = plan.ops().len(),
            "Rendered effect."
        );
        Ok(())
    }

    /// The duration an effect runs for when an action does not give one.
    pub fn default_duration(
        &self,
        effect: &Effect,
        start: f64,
        context: &RenderContext,
    ) -> Result<f64, RenderError> {
        Ok(match effect {
            Effect::Set { .. } => (context.canvas_end - start).max(0.0),
            Effect::Flash {
                fade_seconds,
                fade_beats,
            } => flash_fade(*fade_seconds, *fade_beats, context)?,
            Effect::Strobe { .. } | Effect::Fade { .. } | Effect::Full | Effect::Seek { .. } => {
                DEFAULT_EFFECT_SECS
            }
            Effect::Preset { name } => self.preset(name)?.envelope.default_duration(),
        })
    }

    /// Resolves an effect into paint ops without touching the canvas.
    pub fn plan<'f>(
        &self,
        fixture: &'f FixtureDefinition,
        effect: &Effect,
        start: f64,
        duration: Option<f64>,
        context: &RenderContext,
    ) -> Result<RenderPlan<'f>, RenderError> {
        check_start(start)?;
        let kind = effect.kind();
        if !fixture.supports(kind) {
            return Err(RenderError::UnsupportedEffect {
                fixture: fixture.id().to_string(),
                effect: kind,
            });
        }
        let duration = match duration {
            Some(duration) => check_duration(duration)?,
            None => self.default_duration(effect, start, context)?,
        };
        let end = start + duration;

        let mut plan = RenderPlan::new(fixture);
        if kind.arms_fixture() {
            plan.set_arm(true, start, end)?;
        }

        match effect {
            Effect::Set { channel, value } => {
                plan.set_channel_value(channel, value, start, end)?;
            }
            Effect::Flash {
                fade_seconds,
                fade_beats,
            } => {
                let fade = flash_fade(*fade_seconds, *fade_beats, context)?.min(duration);
                for (_, channel) in fixture.emissive_channels() {
                    plan.ramp(channel, channel.max_raw(), 0, start, fade)?;
                }
            }
            Effect::Strobe { channel, rate } => {
                if !rate.is_finite() || *rate <= 0.0 {
                    return Err(RenderError::InvalidParameter {
                        effect: kind,
                        reason: format!("rate must be positive, got {}", rate),
                    });
                }
                let channels = match channel {
                    Some(channel) => vec![fixture.resolve(channel)?],
                    None => fixture
                        .emissive_channels()
                        .into_iter()
                        .map(|(_, channel)| channel)
                        .collect(),
                };
                for channel in channels {
                    plan.ops.push(PaintOp::Strobe {
                        channel,
                        on: channel.max_raw(),
                        rate: *rate,
                        start,
                        end,
                    });
                }
            }
            Effect::Fade { channel, from, to } => {
                plan.fade_channel(channel, from, to, start, duration)?;
            }
            Effect::Full => {
                for (_, channel) in fixture.emissive_channels() {
                    plan.ops.push(PaintOp::Hold {
                        channel,
                        value: channel.max_raw(),
                        start,
                        end,
                    });
                }
            }
            Effect::Seek { pan, tilt } => {
                if pan.is_none() && tilt.is_none() {
                    return Err(RenderError::InvalidParameter {
                        effect: kind,
                        reason: "needs a pan or tilt target".to_string(),
                    });
                }
                for (axis, target) in [("pan", pan), ("tilt", tilt)] {
                    let Some(target) = target else {
                        continue;
                    };
                    let channel = fixture.resolve(axis)?;
                    let mut value = (*target).min(channel.max_raw());
                    if let Some(constraint) = fixture.constraint(axis) {
                        value = constraint.clamp(value);
                    }
                    plan.ops.push(PaintOp::Hold {
                        channel,
                        value,
                        start,
                        end,
                    });
                }
            }
            Effect::Preset { name } => {
                let preset = self.preset(name)?;
                let weighted: Vec<(ResolvedChannel, f64)> = preset
                    .weights
                    .iter()
                    .filter_map(|(channel, weight)| {
                        fixture.resolve(channel).ok().map(|resolved| (resolved, *weight))
                    })
                    .collect();
                if weighted.is_empty() {
                    return Err(RenderError::NoPresetChannels {
                        fixture: fixture.id().to_string(),
                        preset: name.clone(),
                    });
                }
                for phase in preset.envelope.phases(duration) {
                    if phase.length <= 0.0 {
                        continue;
                    }
                    for (channel, weight) in &weighted {
                        let scale = f64::from(channel.max_raw()) * weight;
                        plan.ramp(
                            *channel,
                            (phase.from * scale).round() as u16,
                            (phase.to * scale).round() as u16,
                            start + phase.offset,
                            phase.length,
                        )?;
                    }
                }
            }
        }
        Ok(plan)
    }

    fn preset(&self, name: &str) -> Result<&super::effects::Preset, RenderError> {
        self.presets
            .get(name)
            .ok_or_else(|| RenderError::UnknownPreset(name.to_string()))
    }
}

fn flash_fade(
    fade_seconds: Option<f64>,
    fade_beats: Option<f64>,
    context: &RenderContext,
) -> Result<f64, RenderError> {
    let fade = match (fade_seconds, fade_beats) {
        (Some(seconds), _) => seconds,
        (None, Some(beats)) => context
            .tempo
            .map(|tempo| tempo.beats_to_seconds(beats))
            .ok_or_else(|| TimeError::MissingBpm(format!("{}b", beats)))?,
        (None, None) => DEFAULT_FLASH_FADE_SECS,
    };
    check_duration(fade)
}

fn level_to_raw(channel: &str, resolved: ResolvedChannel, level: f64) -> Result<u16, RenderError> {
    let level = check_level(level).map_err(|_| RenderError::LevelOutOfRange {
        channel: channel.to_string(),
        level,
    })?;
    Ok((level * f64::from(resolved.max_raw())).round() as u16)
}

fn check_start(start: f64) -> Result<f64, RenderError> {
    if start.is_finite() && start >= 0.0 {
        Ok(start)
    } else {
        Err(RenderError::InvalidStart(start))
    }
}

fn check_duration(duration: f64) -> Result<f64, RenderError> {
    if duration.is_finite() && duration >= 0.0 {
        Ok(duration)
    } else {
        Err(RenderError::InvalidDuration(duration))
    }
}

fn check_span(start: f64, end: f64) -> Result<(), RenderError> {
    check_start(start)?;
    if end.is_nan() || end < start {
        return Err(CanvasError::InvertedRange { start, end }.into());
    }
    Ok(())
}

/// The DMX writes for a raw value: one byte, or coarse and fine bytes.
fn writes(channel: ResolvedChannel, value: u16) -> Vec<ChannelWrite> {
    match channel {
        ResolvedChannel::Coarse(address) => vec![(address, value.min(255) as u8)],
        ResolvedChannel::Fine { msb, lsb } => {
            let (coarse, fine) = split_fine(value);
            vec![(msb, coarse), (lsb, fine)]
        }
    }
}

fn paint_resolved<F>(
    canvas: &mut Canvas,
    channel: ResolvedChannel,
    start: f64,
    end: f64,
    value_fn: F,
) -> Result<(), CanvasError>
where
    F: Fn(f64) -> u16,
{
    match channel {
        ResolvedChannel::Coarse(address) => {
            canvas.paint_channel(address, start, end, |t| value_fn(t).min(255) as u8)
        }
        ResolvedChannel::Fine { msb, lsb } => {
            canvas.paint_channel(msb, start, end, |t| split_fine(value_fn(t)).0)?;
            canvas.paint_channel(lsb, start, end, |t| split_fine(value_fn(t)).1)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::error::Error;

    use super::*;
    use crate::lighting::effects::{Envelope, Preset};
    use crate::testutil::rig;

    fn context() -> RenderContext {
        RenderContext {
            tempo: Tempo::new(120.0).ok(),
            canvas_end: 20.0,
        }
    }

    fn canvas() -> Canvas {
        Canvas::new(44.0, 20.0).unwrap()
    }

    fn render(effect: Effect, fixture: &str, start: f64, duration: Option<f64>) -> Canvas {
        let registry = rig();
        let presets = PresetLibrary::builtin();
        let renderer = FixtureRenderer::new(&registry, &presets);
        let mut canvas = canvas();
        renderer
            .render(fixture, &effect, start, duration, &context(), &mut canvas)
            .unwrap();
        canvas
    }

    fn flash() -> Effect {
        Effect::Flash {
            fade_seconds: None,
            fade_beats: None,
        }
    }

    #[test]
    fn test_flash_scenario() {
        let canvas = render(flash(), "parcan_l", 5.0, Some(1.0));

        let frame = canvas.get_frame(5.0);
        for address in 1..=4 {
            assert_eq!(frame.channel(address), Some(255), "address {}", address);
        }
        let frame = canvas.get_frame(6.0);
        assert!(frame.is_blackout());
        // Fade is over after the default 0.25s but the fixture stays armed.
        let frame = canvas.get_frame(5.5);
        assert_eq!(frame.channel(1), Some(255));
        assert_eq!(frame.channel(2), Some(0));
    }

    #[test]
    fn test_flash_arms_whole_span() {
        let canvas = render(flash(), "parcan_l", 2.0, Some(3.0));
        for i in 0..canvas.frame_count() {
            let time = canvas.frame_time(i);
            let dim = canvas.get_frame(time).channel(1);
            if (2.0..5.0).contains(&time) {
                assert_eq!(dim, Some(255), "frame at {}", time);
            } else {
                assert_eq!(dim, Some(0), "frame at {}", time);
            }
        }
    }

    #[test]
    fn test_flash_without_emissive_channels_only_arms() {
        // The head's only intensity channel is its arm channel.
        let canvas = render(flash(), "head", 2.0, Some(1.0));
        for time in [2.0, 2.2, 2.9] {
            let frame = canvas.get_frame(time);
            assert_eq!(frame.channel(24), Some(255), "frame at {}", time);
            assert_eq!(frame.channel(25), Some(0), "frame at {}", time);
        }
        assert!(canvas.get_frame(3.0).is_blackout());
    }

    #[test]
    fn test_flash_fade_is_monotonic() {
        let canvas = render(
            Effect::Flash {
                fade_seconds: None,
                fade_beats: Some(1.0),
            },
            "parcan_l",
            1.0,
            Some(1.0),
        );
        let mut last = 255;
        for i in 44..66 {
            let red = canvas.get_frame(canvas.frame_time(i)).channel(2).unwrap();
            assert!(red <= last);
            last = red;
        }
        assert!(last < 20);
        assert_eq!(canvas.get_frame(1.5).channel(2), Some(0));
    }

    #[test]
    fn test_set_until_canvas_end() {
        let canvas = render(
            Effect::Set {
                channel: "red".to_string(),
                value: ChannelValue::Level(0.5),
            },
            "parcan_l",
            3.0,
            None,
        );
        assert_eq!(canvas.get_frame(2.9).channel(2), Some(0));
        assert_eq!(canvas.get_frame(3.0).channel(2), Some(128));
        assert_eq!(canvas.get_frame(19.99).channel(2), Some(128));
        // Set does not arm.
        assert_eq!(canvas.get_frame(3.0).channel(1), Some(0));
    }

    #[test]
    fn test_set_label_and_fine() {
        let canvas = render(
            Effect::Set {
                channel: "color".to_string(),
                value: ChannelValue::Label("Blue".to_string()),
            },
            "head",
            0.0,
            Some(1.0),
        );
        assert_eq!(canvas.get_frame(0.5).channel(25), Some(20));

        let canvas = render(
            Effect::Set {
                channel: "pan".to_string(),
                value: ChannelValue::Level(1.0),
            },
            "head",
            0.0,
            Some(1.0),
        );
        assert_eq!(canvas.get_frame(0.5).channel(20), Some(255));
        assert_eq!(canvas.get_frame(0.5).channel(21), Some(255));
    }

    #[test]
    fn test_seek_clamps_to_constraints() {
        let canvas = render(
            Effect::Seek {
                pan: Some(60000),
                tilt: Some(100),
            },
            "head",
            1.0,
            Some(2.0),
        );
        let frame = canvas.get_frame(2.0);
        let pan = join_fine(frame.channel(20).unwrap(), frame.channel(21).unwrap());
        let tilt = join_fine(frame.channel(22).unwrap(), frame.channel(23).unwrap());
        assert_eq!(pan, 50000);
        assert_eq!(tilt, 5000);

        let canvas = render(
            Effect::Seek {
                pan: Some(30000),
                tilt: None,
            },
            "head",
            1.0,
            None,
        );
        let frame = canvas.get_frame(1.5);
        assert_eq!(
            join_fine(frame.channel(20).unwrap(), frame.channel(21).unwrap()),
            30000
        );
        assert!(canvas.get_frame(2.0).is_blackout());
    }

    #[test]
    fn test_strobe_toggles() {
        let registry = rig();
        let presets = PresetLibrary::builtin();
        let renderer = FixtureRenderer::new(&registry, &presets);
        let mut canvas = Canvas::new(40.0, 10.0).unwrap();
        let effect = Effect::Strobe {
            channel: Some("red".to_string()),
            rate: 10.0,
        };
        renderer
            .render("parcan_l", &effect, 1.0, Some(1.0), &context(), &mut canvas)
            .unwrap();

        // 40 fps, 10 toggles per second: 4 frames on, 4 frames off.
        let values: Vec<u8> = (40..48)
            .map(|i| canvas.get_frame(canvas.frame_time(i)).channel(2).unwrap())
            .collect();
        assert_eq!(values, vec![255, 255, 255, 255, 0, 0, 0, 0]);
        assert_eq!(canvas.get_frame(1.5).channel(1), Some(255));
        assert!(canvas.get_frame(2.0).is_blackout());
    }

    #[test]
    fn test_full_and_fade() {
        let canvas = render(Effect::Full, "parcan_r", 0.0, None);
        let frame = canvas.get_frame(0.5);
        for address in 5..=8 {
            assert_eq!(frame.channel(address), Some(255));
        }
        assert!(canvas.get_frame(1.0).is_blackout());

        let canvas = render(
            Effect::Fade {
                channel: "blue".to_string(),
                from: ChannelValue::Level(0.0),
                to: ChannelValue::Level(1.0),
            },
            "parcan_l",
            0.0,
            Some(2.0),
        );
        assert_eq!(canvas.get_frame(0.0).channel(4), Some(0));
        assert_eq!(canvas.get_frame(1.0).channel(4), Some(128));
        assert!(canvas.get_frame(1.99).channel(4).unwrap() > 240);
    }

    #[test]
    fn test_zero_duration_fade_is_a_point() {
        let canvas = render(
            Effect::Fade {
                channel: "green".to_string(),
                from: ChannelValue::Level(0.0),
                to: ChannelValue::Level(1.0),
            },
            "parcan_l",
            2.0,
            Some(0.0),
        );
        assert_eq!(canvas.get_frame(2.0).channel(3), Some(255));
        assert_eq!(canvas.get_frame(2.03).channel(3), Some(0));
    }

    #[test]
    fn test_preset_envelope() -> Result<(), Box<dyn Error>> {
        let registry = rig();
        let mut presets = PresetLibrary::default();
        presets.extend(PresetLibrary::from_yaml(
            std::path::Path::new("test.yaml"),
            "ramp:\n  attack: 1.0\n  decay: 1.0\n  sustain: 0.5\n  release: 1.0\n  hold: 1.0\n  weights:\n    red: 1.0\n    blue: 0.5\n    uv: 1.0\n",
        )?);
        let renderer = FixtureRenderer::new(&registry, &presets);
        let mut canvas = canvas();
        let effect = Effect::Preset {
            name: "ramp".to_string(),
        };
        renderer.render("parcan_l", &effect, 0.0, None, &context(), &mut canvas)?;

        let red = |t: f64| canvas.get_frame(t).channel(2).unwrap();
        let blue = |t: f64| canvas.get_frame(t).channel(4).unwrap();
        assert_eq!(red(0.0), 0);
        assert_eq!(red(0.5), 128);
        assert_eq!(red(1.0), 255);
        assert_eq!(blue(1.0), 128);
        assert_eq!(red(2.5), 128);
        assert_eq!(red(3.5), 64);
        assert_eq!(red(4.0), 0);
        assert_eq!(canvas.get_frame(3.9).channel(1), Some(255));
        assert_eq!(canvas.get_frame(4.0).channel(1), Some(0));
        Ok(())
    }

    fn check_rejected(
        renderer: &FixtureRenderer,
        canvas: &mut Canvas,
        fixture: &str,
        effect: Effect,
        expected: fn(&RenderError) -> bool,
    ) {
        let err = renderer
            .render(fixture, &effect, 1.0, Some(1.0), &context(), canvas)
            .unwrap_err();
        assert!(expected(&err), "{} on {}: unexpected {}", effect, fixture, err);
    }

    #[test]
    fn test_rejections_leave_canvas_untouched() {
        let registry = rig();
        let mut presets = PresetLibrary::builtin();
        presets
            .insert(
                "uv_only",
                Preset {
                    envelope: Envelope {
                        attack: 0.1,
                        decay: 0.1,
                        sustain: 1.0,
                        release: 0.1,
                        hold: 0.1,
                    },
                    weights: BTreeMap::from([("uv".to_string(), 1.0)]),
                },
            )
            .unwrap();
        let renderer = FixtureRenderer::new(&registry, &presets);
        let mut canvas = canvas();

        check_rejected(&renderer, &mut canvas, "nope", flash(), |e| {
            matches!(e, RenderError::Fixture(FixtureError::UnknownFixture(_)))
        });
        check_rejected(
            &renderer,
            &mut canvas,
            "parcan_l",
            Effect::Seek {
                pan: Some(1),
                tilt: None,
            },
            |e| matches!(e, RenderError::UnsupportedEffect { .. }),
        );
        check_rejected(
            &renderer,
            &mut canvas,
            "parcan_l",
            Effect::Set {
                channel: "red".to_string(),
                value: ChannelValue::Level(1.5),
            },
            |e| matches!(e, RenderError::LevelOutOfRange { .. }),
        );
        check_rejected(
            &renderer,
            &mut canvas,
            "parcan_l",
            Effect::Fade {
                channel: "red".to_string(),
                from: ChannelValue::Level(0.0),
                to: ChannelValue::Label("purple".to_string()),
            },
            |e| matches!(e, RenderError::UnknownLabel { .. }),
        );
        check_rejected(
            &renderer,
            &mut canvas,
            "parcan_l",
            Effect::Set {
                channel: "pan".to_string(),
                value: ChannelValue::Level(0.5),
            },
            |e| matches!(e, RenderError::Fixture(FixtureError::UnknownChannel { .. })),
        );
        check_rejected(
            &renderer,
            &mut canvas,
            "parcan_l",
            Effect::Strobe {
                channel: None,
                rate: 0.0,
            },
            |e| matches!(e, RenderError::InvalidParameter { .. }),
        );
        check_rejected(
            &renderer,
            &mut canvas,
            "parcan_l",
            Effect::Preset {
                name: "missing".to_string(),
            },
            |e| matches!(e, RenderError::UnknownPreset(_)),
        );
        check_rejected(
            &renderer,
            &mut canvas,
            "parcan_l",
            Effect::Preset {
                name: "uv_only".to_string(),
            },
            |e| matches!(e, RenderError::NoPresetChannels { .. }),
        );

        let beats_without_tempo = RenderContext {
            tempo: None,
            canvas_end: 20.0,
        };
        let effect = Effect::Flash {
            fade_seconds: None,
            fade_beats: Some(1.0),
        };
        assert!(matches!(
            renderer.render("parcan_l", &effect, 1.0, None, &beats_without_tempo, &mut canvas),
            Err(RenderError::Time(TimeError::MissingBpm(_)))
        ));
        assert!(matches!(
            renderer.render("parcan_l", &flash(), -1.0, None, &context(), &mut canvas),
            Err(RenderError::InvalidStart(_))
        ));

        assert_eq!(canvas, Canvas::new(44.0, 20.0).unwrap());
    }
}
