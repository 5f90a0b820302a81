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
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::fixture::{FixtureDefinition, FixtureError, RawFixture};

/// A fixture file holds either one definition or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureFile {
    Many(Vec<RawFixture>),
    One(Box<RawFixture>),
}

/// All known fixtures by id. Definitions are shared read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct FixtureRegistry {
    fixtures: BTreeMap<String, Arc<FixtureDefinition>>,
}

impl FixtureRegistry {
    pub fn new() -> FixtureRegistry {
        FixtureRegistry::default()
    }

    /// Loads fixtures from a JSON file, or from every `*.json` file under a directory.
    pub fn load(path: &Path) -> Result<FixtureRegistry, FixtureError> {
        let mut registry = FixtureRegistry::new();
        if path.is_dir() {
            registry.load_directory(path)?;
        } else {
            registry.load_file(path)?;
        }
        registry.warn_on_overlaps();
        info!(
            path = %path.display(),
            count = registry.fixtures.len(),
            "Loaded fixture definitions."
        );
        Ok(registry)
    }

    /// Builds a registry from raw definitions, validating each one.
    pub fn from_raw(raw: Vec<RawFixture>) -> Result<FixtureRegistry, FixtureError> {
        let mut registry = FixtureRegistry::new();
        for fixture in raw {
            registry.insert(FixtureDefinition::from_raw(fixture)?)?;
        }
        registry.warn_on_overlaps();
        Ok(registry)
    }

    fn load_directory(&mut self, dir: &Path) -> Result<(), FixtureError> {
        let io_error = |source| FixtureError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = fs::read_dir(dir)
            .map_err(io_error)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<PathBuf>, _>>()
            .map_err(io_error)?;
        // Directory order is filesystem dependent.
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self.load_directory(&path)?;
            } else if path.extension().is_some_and(|ext| ext == "json") {
                self.load_file(&path)?;
            }
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<(), FixtureError> {
        let content = fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FixtureFile =
            serde_json::from_str(&content).map_err(|source| FixtureError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let raw = match file {
            FixtureFile::Many(raw) => raw,
            FixtureFile::One(raw) => vec![*raw],
        };
        for fixture in raw {
            let fixture = FixtureDefinition::from_raw(fixture)?;
            info!(fixture = fixture.id(), path = %path.display(), "Loading fixture");
            self.insert(fixture)?;
        }
        Ok(())
    }

    /// Adds a validated fixture. Ids must be unique.
    pub fn insert(&mut self, fixture: FixtureDefinition) -> Result<(), FixtureError> {
        if self.fixtures.contains_key(fixture.id()) {
            return Err(FixtureError::DuplicateId(fixture.id().to_string()));
        }
        self.fixtures
            .insert(fixture.id().to_string(), Arc::new(fixture));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<FixtureDefinition>, FixtureError> {
        self.fixtures
            .get(id)
            .cloned()
            .ok_or_else(|| FixtureError::UnknownFixture(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fixtures.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FixtureDefinition> {
        self.fixtures.values().map(Arc::as_ref)
    }

    /// Addresses claimed by more than one fixture, with the fixtures claiming them.
    pub fn overlaps(&self) -> BTreeMap<u16, Vec<String>> {
        let mut claims: BTreeMap<u16, Vec<String>> = BTreeMap::new();
        for fixture in self.fixtures.values() {
            for address in fixture.addresses().values() {
                claims
                    .entry(*address)
                    .or_default()
                    .push(fixture.id().to_string());
            }
        }
        claims.retain(|_, fixtures| fixtures.len() > 1);
        claims
    }

    // Overlap is allowed (e.g. two heads patched to mirror each other) but usually a typo.
    fn warn_on_overlaps(&self) {
        for (address, fixtures) in self.overlaps() {
            warn!(
                address,
                fixtures = %fixtures.join(", "),
                "DMX address is shared by multiple fixtures."
            );
        }
    }
}
