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

use std::path::{Path, PathBuf};
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::dmx::positive_fps;
use super::ConfigError;

/// The song length used when a song is loaded without one.
pub const DEFAULT_SONG_DURATION: Duration = Duration::from_secs(300);

/// A YAML representation of the lighting configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Lighting {
    /// A fixture definition file, or a directory searched for *.json files.
    fixtures: Option<PathBuf>,

    /// An optional YAML file of presets added to the built-in ones.
    presets: Option<PathBuf>,

    /// Where per-song actions sheets are kept.
    actions_dir: Option<PathBuf>,

    /// Canvas frames per second.
    fps: Option<f64>,

    /// Song length when none is given, e.g. "5m".
    default_song_duration: Option<String>,

    /// Re-render the canvas after every change to the actions sheet.
    auto_render: Option<bool>,
}

impl Lighting {
    /// Creates a new lighting configuration.
    pub fn new(
        fixtures: Option<PathBuf>,
        presets: Option<PathBuf>,
        actions_dir: Option<PathBuf>,
    ) -> Lighting {
        Lighting {
            fixtures,
            presets,
            actions_dir,
            ..Default::default()
        }
    }

    pub fn fixtures(&self) -> Option<&Path> {
        self.fixtures.as_deref()
    }

    pub fn presets(&self) -> Option<&Path> {
        self.presets.as_deref()
    }

    pub fn actions_dir(&self) -> Option<&Path> {
        self.actions_dir.as_deref()
    }

    pub fn fps(&self) -> Result<f64, ConfigError> {
        positive_fps("lighting.fps", self.fps)
    }

    /// Gets the default song duration.
    pub fn default_song_duration(&self) -> Result<Duration, ConfigError> {
        let duration: Duration = match &self.default_song_duration {
            Some(value) => DurationString::from_string(value.clone())
                .map_err(|source| ConfigError::Duration {
                    value: value.clone(),
                    source,
                })?
                .into(),
            None => DEFAULT_SONG_DURATION,
        };
        if duration.is_zero() {
            return Err(ConfigError::Invalid {
                field: "lighting.default_song_duration",
                value: format!("{:?}", duration),
                expected: "a non-zero duration",
            });
        }
        Ok(duration)
    }

    pub fn auto_render(&self) -> bool {
        self.auto_render.unwrap_or(true)
    }

    /// Makes relative paths relative to the directory holding the config file.
    pub(super) fn rebase(&mut self, base: &Path) {
        for path in [&mut self.fixtures, &mut self.presets, &mut self.actions_dir]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.fps()?;
        self.default_song_duration()?;
        Ok(())
    }
}
