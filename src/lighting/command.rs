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

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::actions::{Action, ActionId, Selector};
use super::effects::{ChannelValue, Effect, EffectKind, UnknownEffect, DEFAULT_STROBE_RATE};
use super::tempo::{Tempo, TimeError, TimeLiteral};

#[derive(Parser)]
#[grammar = "src/lighting/command.pest"]
pub struct CommandParser;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Syntax(Box<pest::error::Error<Rule>>),
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error(transparent)]
    UnknownEffect(#[from] UnknownEffect),
    #[error("'{0}' needs an 'at <time>' clause")]
    MissingStart(&'static str),
    #[error("'{clause}' cannot be used with '{command}'")]
    UnexpectedClause {
        clause: &'static str,
        command: &'static str,
    },
    #[error("'{0}' is given more than once")]
    DuplicateClause(&'static str),
    #[error("{0} needs parameters, use #{0} instead of #add")]
    NeedsParameters(EffectKind),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

/// The optional trailing clauses, each at most once, in any order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clauses {
    pub at: Option<TimeLiteral>,
    pub duration: Option<TimeLiteral>,
    pub group: Option<String>,
    pub rate: Option<f64>,
    pub fade: Option<TimeLiteral>,
}

/// A parsed command. Times are kept as written until the tempo and playback position are known.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add {
        effect: EffectKind,
        fixture: String,
        clauses: Clauses,
    },
    Set {
        fixture: String,
        channel: String,
        value: ChannelValue,
        clauses: Clauses,
    },
    Fade {
        fixture: String,
        channel: String,
        from: ChannelValue,
        to: ChannelValue,
        clauses: Clauses,
    },
    Strobe {
        fixture: String,
        channel: Option<String>,
        clauses: Clauses,
    },
    Preset {
        fixture: String,
        preset: String,
        clauses: Clauses,
    },
    Clear(Selector),
    Render,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Set { .. } => "set",
            Command::Fade { .. } => "fade",
            Command::Strobe { .. } => "strobe",
            Command::Preset { .. } => "preset",
            Command::Clear(_) => "clear",
            Command::Render => "render",
        }
    }

    /// Builds the action this command adds, if it adds one. `now` stands in for a missing
    /// start time on `#fade` and `#strobe`.
    pub fn to_action(&self, tempo: Option<Tempo>, now: f64) -> Result<Option<Action>, CommandError> {
        let name = self.name();
        let (fixture, effect, clauses, start_required) = match self {
            Command::Add {
                effect,
                fixture,
                clauses,
            } => {
                reject(name, "rate", clauses.rate.is_some() && *effect != EffectKind::Strobe)?;
                reject(name, "fade", clauses.fade.is_some() && *effect != EffectKind::Flash)?;
                let effect = match *effect {
                    EffectKind::Flash => Effect::Flash {
                        fade_seconds: clauses
                            .fade
                            .map(|fade| fade.to_seconds(tempo))
                            .transpose()?,
                        fade_beats: None,
                    },
                    EffectKind::Strobe => Effect::Strobe {
                        channel: None,
                        rate: clauses.rate.unwrap_or(DEFAULT_STROBE_RATE),
                    },
                    kind => Effect::with_defaults(kind).ok_or(CommandError::NeedsParameters(kind))?,
                };
                (fixture, effect, clauses, true)
            }
            Command::Set {
                fixture,
                channel,
                value,
                clauses,
            } => {
                reject(name, "rate", clauses.rate.is_some())?;
                reject(name, "fade", clauses.fade.is_some())?;
                let effect = Effect::Set {
                    channel: channel.clone(),
                    value: value.clone(),
                };
                (fixture, effect, clauses, true)
            }
            Command::Fade {
                fixture,
                channel,
                from,
                to,
                clauses,
            } => {
                reject(name, "rate", clauses.rate.is_some())?;
                reject(name, "fade", clauses.fade.is_some())?;
                let effect = Effect::Fade {
                    channel: channel.clone(),
                    from: from.clone(),
                    to: to.clone(),
                };
                (fixture, effect, clauses, false)
            }
            Command::Strobe {
                fixture,
                channel,
                clauses,
            } => {
                reject(name, "fade", clauses.fade.is_some())?;
                let effect = Effect::Strobe {
                    channel: channel.clone(),
                    rate: clauses.rate.unwrap_or(DEFAULT_STROBE_RATE),
                };
                (fixture, effect, clauses, false)
            }
            Command::Preset {
                fixture,
                preset,
                clauses,
            } => {
                reject(name, "rate", clauses.rate.is_some())?;
                reject(name, "fade", clauses.fade.is_some())?;
                let effect = Effect::Preset {
                    name: preset.clone(),
                };
                (fixture, effect, clauses, true)
            }
            Command::Clear(_) | Command::Render => return Ok(None),
        };

        let start = match clauses.at {
            Some(at) => at.to_seconds(tempo)?,
            None if start_required => return Err(CommandError::MissingStart(name)),
            None => now,
        };
        let duration = clauses
            .duration
            .map(|duration| duration.to_seconds(tempo))
            .transpose()?;

        Ok(Some(Action {
            fixture: fixture.clone(),
            effect,
            start,
            duration,
            group: clauses.group.clone(),
        }))
    }
}

fn reject(command: &'static str, clause: &'static str, present: bool) -> Result<(), CommandError> {
    if present {
        Err(CommandError::UnexpectedClause { clause, command })
    } else {
        Ok(())
    }
}

/// Parses one `#...` command line.
pub fn parse_command(text: &str) -> Result<Command, CommandError> {
    let mut pairs = CommandParser::parse(Rule::command, text.trim())
        .map_err(|e| CommandError::Syntax(Box::new(e)))?;
    let body = pairs
        .next()
        .and_then(|command| command.into_inner().next())
        .ok_or_else(|| {
            CommandError::Syntax(Box::new(pest::error::Error::new_from_pos(
                pest::error::ErrorVariant::CustomError {
                    message: "empty command".to_string(),
                },
                pest::Position::from_start(text),
            )))
        })?;

    let rule = body.as_rule();
    let parts: Vec<Pair<Rule>> = body.into_inner().collect();
    let text_of = |rule: Rule| -> Option<String> {
        parts
            .iter()
            .find(|pair| pair.as_rule() == rule)
            .map(|pair| pair.as_str().to_string())
    };
    let required = |rule: Rule| -> String { text_of(rule).unwrap_or_default() };
    let clauses = || -> Result<Clauses, CommandError> {
        match parts.iter().find(|pair| pair.as_rule() == Rule::clauses) {
            Some(pair) => parse_clauses(pair.clone().into_inner()),
            None => Ok(Clauses::default()),
        }
    };
    let value_of = |rule: Rule| -> ChannelValue {
        parts
            .iter()
            .find(|pair| pair.as_rule() == rule)
            .and_then(|pair| {
                pair.clone()
                    .into_inner()
                    .flatten()
                    .find(|inner| matches!(inner.as_rule(), Rule::level | Rule::label))
            })
            .map(parse_value)
            .unwrap_or(ChannelValue::Level(0.0))
    };

    Ok(match rule {
        Rule::add => Command::Add {
            effect: required(Rule::effect_name).parse()?,
            fixture: required(Rule::fixture),
            clauses: clauses()?,
        },
        Rule::set => Command::Set {
            fixture: required(Rule::fixture),
            channel: required(Rule::channel),
            value: value_of(Rule::value),
            clauses: clauses()?,
        },
        Rule::fade => Command::Fade {
            fixture: required(Rule::fixture),
            channel: required(Rule::channel),
            from: value_of(Rule::from_value),
            to: value_of(Rule::to_value),
            clauses: clauses()?,
        },
        Rule::strobe => Command::Strobe {
            fixture: required(Rule::fixture),
            channel: text_of(Rule::channel),
            clauses: clauses()?,
        },
        Rule::preset => Command::Preset {
            fixture: required(Rule::fixture),
            preset: required(Rule::preset_name),
            clauses: clauses()?,
        },
        Rule::clear => {
            let selector = if let Some(id) = text_of(Rule::action_id) {
                Selector::Id(
                    id.parse::<ActionId>()
                        .map_err(|_| CommandError::InvalidNumber(id))?,
                )
            } else if let Some(group) = text_of(Rule::group_name) {
                Selector::Group(group)
            } else {
                Selector::All
            };
            Command::Clear(selector)
        }
        _ => Command::Render,
    })
}

fn parse_value(pair: Pair<Rule>) -> ChannelValue {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::level => text
            .parse::<f64>()
            .map(ChannelValue::Level)
            .unwrap_or_else(|_| ChannelValue::Label(text.to_string())),
        _ => ChannelValue::Label(text.to_string()),
    }
}

fn parse_clauses(pairs: Pairs<Rule>) -> Result<Clauses, CommandError> {
    let mut clauses = Clauses::default();
    for clause in pairs {
        let rule = clause.as_rule();
        let argument = clause
            .into_inner()
            .find(|pair| {
                matches!(
                    pair.as_rule(),
                    Rule::time | Rule::group_name | Rule::rate_value
                )
            })
            .map(|pair| pair.as_str().to_string())
            .unwrap_or_default();

        match rule {
            Rule::at_clause => set_once(&mut clauses.at, "at", argument.parse()?)?,
            Rule::for_clause => set_once(&mut clauses.duration, "duration", argument.parse()?)?,
            Rule::fade_clause => set_once(&mut clauses.fade, "fade", argument.parse()?)?,
            Rule::group_clause => set_once(&mut clauses.group, "group", argument)?,
            Rule::rate_clause => {
                let lowered = argument.to_ascii_lowercase();
                let rate = lowered
                    .trim_end_matches("hz")
                    .parse::<f64>()
                    .map_err(|_| CommandError::InvalidNumber(argument.clone()))?;
                set_once(&mut clauses.rate, "rate", rate)?
            }
            _ => {}
        }
    }
    Ok(clauses)
}

fn set_once<T>(slot: &mut Option<T>, clause: &'static str, value: T) -> Result<(), CommandError> {
    if slot.is_some() {
        return Err(CommandError::DuplicateClause(clause));
    }
    *slot = Some(value);
    Ok(())
}
