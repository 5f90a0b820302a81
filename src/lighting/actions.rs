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
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, warn, Level};

use super::canvas::Canvas;
use super::effects::Effect;
use super::renderer::{FixtureRenderer, RenderContext, RenderError};

pub type ActionId = u64;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("action {0} already exists")]
    DuplicateId(ActionId),
    #[error("action id {0} leaves no room for another id")]
    IdOutOfRange(ActionId),
    #[error("unable to access actions sheet {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed actions sheet {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A timed effect on a fixture, before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub fixture: String,
    #[serde(flatten)]
    pub effect: Effect,
    pub start: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// An action as stored in the sheet. Records are never edited in place, only added or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionId,
    #[serde(flatten)]
    pub action: Action,
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} on {} at {}s",
            self.id, self.action.effect, self.action.fixture, self.action.start
        )?;
        if let Some(duration) = self.action.duration {
            write!(f, " for {}s", duration)?;
        }
        if let Some(group) = &self.action.group {
            write!(f, " [{}]", group)?;
        }
        Ok(())
    }
}

/// Which records a removal applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    Id(ActionId),
    Group(String),
}

impl Selector {
    fn matches(&self, record: &ActionRecord) -> bool {
        match self {
            Selector::All => true,
            Selector::Id(id) => record.id == *id,
            Selector::Group(group) => record.action.group.as_deref() == Some(group.as_str()),
        }
    }
}

/// The outcome of a render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub painted: usize,
    pub skipped: Vec<(ActionId, String)>,
}

impl fmt::Display for RenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} painted, {} skipped", self.painted, self.skipped.len())?;
        for (id, reason) in &self.skipped {
            write!(f, "\n  #{}: {}", id, reason)?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct SheetFile {
    next_id: ActionId,
    actions: Vec<ActionRecord>,
}

/// The ordered log of actions for one song. The canvas is a pure function of this list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionsSheet {
    next_id: ActionId,
    records: Vec<ActionRecord>,
}

impl ActionsSheet {
    pub fn new() -> ActionsSheet {
        ActionsSheet::default()
    }

    /// Records in render order: start time, then id.
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: ActionId) -> Option<&ActionRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Validates an action against the rig and adds it. Without an explicit id the next
    /// free id is assigned. Returns the id.
    pub fn add(
        &mut self,
        action: Action,
        id: Option<ActionId>,
        renderer: &FixtureRenderer,
        context: &RenderContext,
    ) -> Result<ActionId, ActionError> {
        let fixture = renderer.registry().get(&action.fixture).map_err(RenderError::from)?;
        renderer.plan(
            &fixture,
            &action.effect,
            action.start,
            action.duration,
            context,
        )?;

        let id = match id {
            Some(id) if self.get(id).is_some() => return Err(ActionError::DuplicateId(id)),
            Some(id) => id,
            None => self.next_id,
        };
        let next = id.checked_add(1).ok_or(ActionError::IdOutOfRange(id))?;
        self.next_id = self.next_id.max(next);
        self.insert(ActionRecord { id, action });
        debug!(id, "Action added.");
        Ok(id)
    }

    fn insert(&mut self, record: ActionRecord) {
        let position = self.records.partition_point(|existing| {
            existing
                .action
                .start
                .total_cmp(&record.action.start)
                .then(existing.id.cmp(&record.id))
                .is_lt()
        });
        self.records.insert(position, record);
    }

    /// Removes matching records and returns how many went.
    pub fn remove(&mut self, selector: &Selector) -> usize {
        let before = self.records.len();
        self.records.retain(|record| !selector.matches(record));
        let removed = before - self.records.len();
        debug!(?selector, removed, "Actions removed.");
        removed
    }

    /// Clears the canvas and replays every action onto it. Actions that fail are skipped and
    /// reported, the rest still render.
    pub fn render(
        &self,
        renderer: &FixtureRenderer,
        context: &RenderContext,
        canvas: &mut Canvas,
    ) -> RenderReport {
        let span = span!(Level::INFO, "render", actions = self.records.len());
        let _enter = span.enter();

        canvas.clear();
        let mut report = RenderReport::default();
        for record in &self.records {
            let action = &record.action;
            match renderer.render(
                &action.fixture,
                &action.effect,
                action.start,
                action.duration,
                context,
                canvas,
            ) {
                Ok(()) => report.painted += 1,
                Err(e) => {
                    warn!(id = record.id, err = %e, "Skipping action.");
                    report.skipped.push((record.id, e.to_string()));
                }
            }
        }
        info!(
            painted = report.painted,
            skipped = report.skipped.len(),
            "Render complete."
        );
        report
    }

    /// Writes the sheet as JSON.
    pub fn save(&self, path: &Path) -> Result<(), ActionError> {
        let file = SheetFile {
            next_id: self.next_id,
            actions: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| ActionError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ActionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ActionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), actions = self.records.len(), "Actions sheet saved.");
        Ok(())
    }

    /// Reads a sheet written by `save`. A missing file is an empty sheet. Records are not
    /// checked against the rig here; bad ones are reported when rendered.
    pub fn load(path: &Path) -> Result<ActionsSheet, ActionError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ActionsSheet::new()),
            Err(source) => {
                return Err(ActionError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let file: SheetFile =
            serde_json::from_str(&content).map_err(|source| ActionError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let mut sheet = ActionsSheet {
            next_id: file.next_id,
            records: Vec::with_capacity(file.actions.len()),
        };
        for record in file.actions {
            if sheet.get(record.id).is_some() {
                return Err(ActionError::DuplicateId(record.id));
            }
            let next = record
                .id
                .checked_add(1)
                .ok_or(ActionError::IdOutOfRange(record.id))?;
            sheet.next_id = sheet.next_id.max(next);
            sheet.insert(record);
        }
        info!(path = %path.display(), actions = sheet.len(), "Actions sheet loaded.");
        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::lighting::effects::{ChannelValue, PresetLibrary};
    use crate::lighting::registry::FixtureRegistry;
    use crate::testutil::rig;

    fn context() -> RenderContext {
        RenderContext {
            tempo: None,
            canvas_end: 30.0,
        }
    }

    fn flash(fixture: &str, start: f64, group: Option<&str>) -> Action {
        Action {
            fixture: fixture.to_string(),
            effect: Effect::Flash {
                fade_seconds: None,
                fade_beats: None,
            },
            start,
            duration: Some(1.0),
            group: group.map(str::to_string),
        }
    }

    struct Rig {
        registry: FixtureRegistry,
        presets: PresetLibrary,
    }

    impl Rig {
        fn new() -> Rig {
            Rig {
                registry: rig(),
                presets: PresetLibrary::builtin(),
            }
        }

        fn renderer(&self) -> FixtureRenderer<'_> {
            FixtureRenderer::new(&self.registry, &self.presets)
        }
    }

    #[test]
    fn test_add_orders_and_assigns_ids() {
        let rig = Rig::new();
        let renderer = rig.renderer();
        let mut sheet = ActionsSheet::new();

        let a = sheet
            .add(flash("parcan_l", 5.0, None), None, &renderer, &context())
            .unwrap();
        let b = sheet
            .add(flash("parcan_r", 1.0, None), None, &renderer, &context())
            .unwrap();
        let c = sheet
            .add(flash("parcan_r", 5.0, None), None, &renderer, &context())
            .unwrap();
        assert_eq!((a, b, c), (0, 1, 2));

        let order: Vec<ActionId> = sheet.records().iter().map(|r| r.id).collect();
        assert_eq!(order, vec![1, 0, 2]);

        assert!(matches!(
            sheet.add(flash("parcan_l", 0.0, None), Some(1), &renderer, &context()),
            Err(ActionError::DuplicateId(1))
        ));
        assert_eq!(
            sheet
                .add(flash("parcan_l", 0.0, None), Some(10), &renderer, &context())
                .unwrap(),
            10
        );
        assert_eq!(
            sheet
                .add(flash("parcan_l", 0.0, None), None, &renderer, &context())
                .unwrap(),
            11
        );
    }

    #[test]
    fn test_add_rejects_invalid_actions() {
        let rig = Rig::new();
        let renderer = rig.renderer();
        let mut sheet = ActionsSheet::new();

        assert!(sheet
            .add(flash("ghost", 1.0, None), None, &renderer, &context())
            .is_err());
        assert!(sheet
            .add(flash("parcan_l", -1.0, None), None, &renderer, &context())
            .is_err());
        let seek_on_par = Action {
            effect: Effect::Seek {
                pan: Some(100),
                tilt: None,
            },
            ..flash("parcan_l", 1.0, None)
        };
        assert!(matches!(
            sheet.add(seek_on_par, None, &renderer, &context()),
            Err(ActionError::Render(RenderError::UnsupportedEffect { .. }))
        ));
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_clear_group_twice() {
        let rig = Rig::new();
        let renderer = rig.renderer();
        let mut sheet = ActionsSheet::new();
        for start in [1.0, 2.0, 3.0] {
            sheet
                .add(flash("parcan_l", start, Some("X")), None, &renderer, &context())
                .unwrap();
        }
        let keep = sheet
            .add(flash("parcan_r", 2.0, Some("Y")), None, &renderer, &context())
            .unwrap();

        assert_eq!(sheet.remove(&Selector::Group("X".to_string())), 3);
        assert_eq!(sheet.remove(&Selector::Group("X".to_string())), 0);
        assert_eq!(sheet.len(), 1);
        assert_eq!(sheet.records()[0].id, keep);

        assert_eq!(sheet.remove(&Selector::Id(keep)), 1);
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_render_is_deterministic() {
        let rig = Rig::new();
        let renderer = rig.renderer();
        let mut sheet = ActionsSheet::new();
        sheet
            .add(flash("parcan_l", 5.0, None), None, &renderer, &context())
            .unwrap();
        let fade = Action {
            fixture: "parcan_l".to_string(),
            effect: Effect::Fade {
                channel: "red".to_string(),
                from: ChannelValue::Level(0.0),
                to: ChannelValue::Level(1.0),
            },
            start: 4.5,
            duration: Some(2.0),
            group: None,
        };
        sheet.add(fade, None, &renderer, &context()).unwrap();
        sheet
            .add(
                Action {
                    fixture: "parcan_r".to_string(),
                    effect: Effect::Preset {
                        name: "amber_swell".to_string(),
                    },
                    start: 0.0,
                    duration: None,
                    group: None,
                },
                None,
                &renderer,
                &context(),
            )
            .unwrap();

        let mut first = Canvas::new(44.0, 30.0).unwrap();
        let report = sheet.render(&renderer, &context(), &mut first);
        assert_eq!(report.painted, 3);
        assert!(report.skipped.is_empty());

        let mut second = first.clone();
        second.paint_frame(10.0, &[(100, 1)]).unwrap();
        sheet.render(&renderer, &context(), &mut second);
        assert_eq!(first, second);

        // The flash starts after the fade, so it wins at 5.0.
        assert_eq!(first.get_frame(5.0).channel(2), Some(255));
    }

    #[test]
    fn test_empty_render_blacks_out() {
        let rig = Rig::new();
        let renderer = rig.renderer();
        let mut canvas = Canvas::new(44.0, 5.0).unwrap();
        canvas.paint_range(0.0, 5.0, &[(1, 255)]).unwrap();

        let report = ActionsSheet::new().render(&renderer, &context(), &mut canvas);
        assert_eq!(report, RenderReport::default());
        assert_eq!(canvas, Canvas::new(44.0, 5.0).unwrap());
    }

    #[test]
    fn test_bad_records_are_skipped() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("song.json");
        fs::write(
            &path,
            serde_json::json!({
                "next_id": 2,
                "actions": [
                    {"id": 0, "fixture": "retired_par", "effect": "flash", "start": 1.0},
                    {"id": 1, "fixture": "parcan_l", "effect": "full", "start": 2.0},
                ]
            })
            .to_string(),
        )?;
        let sheet = ActionsSheet::load(&path)?;
        let rig = Rig::new();
        let mut canvas = Canvas::new(44.0, 5.0)?;
        let report = sheet.render(&rig.renderer(), &context(), &mut canvas);

        assert_eq!(report.painted, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, 0);
        assert!(report.skipped[0].1.contains("retired_par"));
        assert_eq!(canvas.get_frame(2.5).channel(2), Some(255));
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<(), Box<dyn Error>> {
        let rig = Rig::new();
        let renderer = rig.renderer();
        let mut sheet = ActionsSheet::new();
        sheet.add(flash("parcan_l", 3.0, Some("drop")), None, &renderer, &context())?;
        sheet.add(
            Action {
                fixture: "head".to_string(),
                effect: Effect::Set {
                    channel: "color".to_string(),
                    value: ChannelValue::Label("red".to_string()),
                },
                start: 1.0,
                duration: None,
                group: None,
            },
            None,
            &renderer,
            &context(),
        )?;
        sheet.remove(&Selector::Id(1));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("actions").join("song.json");
        sheet.save(&path)?;
        let mut loaded = ActionsSheet::load(&path)?;
        assert_eq!(loaded, sheet);

        // Ids stay monotonic across a reload even though id 1 was removed.
        let id = loaded.add(flash("parcan_r", 0.0, None), None, &renderer, &context())?;
        assert_eq!(id, 2);

        assert!(ActionsSheet::load(&dir.path().join("missing.json"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_max_id_is_rejected() -> Result<(), Box<dyn Error>> {
        let rig = Rig::new();
        let renderer = rig.renderer();
        let mut sheet = ActionsSheet::new();
        assert!(matches!(
            sheet.add(flash("parcan_l", 1.0, None), Some(u64::MAX), &renderer, &context()),
            Err(ActionError::IdOutOfRange(u64::MAX))
        ));
        assert!(sheet.is_empty());
        assert_eq!(
            sheet.add(flash("parcan_l", 1.0, None), Some(u64::MAX - 1), &renderer, &context())?,
            u64::MAX - 1
        );

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("song.json");
        fs::write(
            &path,
            serde_json::json!({
                "next_id": 0,
                "actions": [
                    {"id": u64::MAX, "fixture": "parcan_l", "effect": "full", "start": 1.0},
                ]
            })
            .to_string(),
        )?;
        assert!(matches!(
            ActionsSheet::load(&path),
            Err(ActionError::IdOutOfRange(u64::MAX))
        ));
        Ok(())
    }
}
