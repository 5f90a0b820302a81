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

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

mod dmx;
mod error;
mod lighting;

pub use self::dmx::Dmx;
pub use self::error::ConfigError;
pub use self::lighting::Lighting;

/// Environment variables with this prefix override file values, e.g.
/// CUECANVAS__DMX__TARGET=10.0.0.20.
pub const ENV_PREFIX: &str = "CUECANVAS";

/// The engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    #[serde(default)]
    lighting: Lighting,

    #[serde(default)]
    dmx: Dmx,
}

impl EngineConfig {
    /// Loads the config file, applies environment overrides and validates the result. Relative
    /// paths in the file are taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<EngineConfig, ConfigError> {
        let mut engine_config: EngineConfig = Config::builder()
            .add_source(File::from(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        if let Some(base) = path.parent() {
            engine_config.lighting.rebase(base);
        }
        engine_config.validate()?;
        info!(path = %path.display(), "Loaded engine config.");
        Ok(engine_config)
    }

    /// Parses a YAML config without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<EngineConfig, ConfigError> {
        let engine_config: EngineConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        engine_config.validate()?;
        Ok(engine_config)
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    pub fn dmx(&self) -> &Dmx {
        &self.dmx
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.lighting.validate()?;
        self.dmx.validate()
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
