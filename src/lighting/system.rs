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
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::actions::{Action, ActionError, ActionId, ActionRecord, ActionsSheet, RenderReport, Selector};
use super::canvas::{Canvas, CanvasError, CanvasHandle, ChannelWrite};
use super::command::{parse_command, Command, CommandError};
use super::effects::preset::PresetError;
use super::effects::PresetLibrary;
use super::fixture::{FixtureError, ResolvedChannel};
use super::registry::FixtureRegistry;
use super::renderer::{FixtureRenderer, RenderContext, RenderError};
use super::tempo::{Tempo, TimeError};
use crate::config::{ConfigError, Lighting};
use crate::dmx::universe::{level_to_dmx, level_to_fine, Universe};
use crate::playsync::{PlaybackState, SyncEvent};

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error(transparent)]
    Preset(#[from] PresetError),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("no song is loaded")]
    NoSong,
    #[error("invalid song name {0:?}: must be non-empty without path separators or \"..\"")]
    SongName(String),
}

/// How the lighting system sizes its canvas and handles the actions sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSettings {
    pub fps: f64,
    /// Canvas length, in seconds, for songs loaded without a duration.
    pub default_duration: f64,
    pub auto_render: bool,
    pub actions_dir: Option<PathBuf>,
}

/// What a command did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Added {
        id: ActionId,
        report: Option<RenderReport>,
    },
    Removed {
        count: usize,
        report: Option<RenderReport>,
    },
    Rendered(RenderReport),
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = match self {
            CommandOutcome::Added { id, report } => {
                write!(f, "added action #{}", id)?;
                report
            }
            CommandOutcome::Removed { count, report } => {
                write!(f, "removed {} action(s)", count)?;
                report
            }
            CommandOutcome::Rendered(report) => return write!(f, "rendered: {}", report),
        };
        match report {
            Some(report) => write!(f, ", rendered: {}", report),
            None => Ok(()),
        }
    }
}

struct Session {
    song: Option<String>,
    tempo: Option<Tempo>,
    sheet: ActionsSheet,
}

/// Owns the rig, the canvas and the current song's actions sheet. Sheet edits take the
/// session lock, then the canvas lock, never the other way round.
pub struct LightingSystem {
    registry: FixtureRegistry,
    presets: PresetLibrary,
    canvas: CanvasHandle,
    playback: PlaybackState,
    session: Mutex<Session>,
    settings: SystemSettings,
}

impl LightingSystem {
    /// Creates a lighting system with an empty canvas of the default duration.
    pub fn new(
        registry: FixtureRegistry,
        presets: PresetLibrary,
        settings: SystemSettings,
    ) -> Result<LightingSystem, SystemError> {
        let canvas = Canvas::new(settings.fps, settings.default_duration)?.into_handle();
        Ok(LightingSystem {
            registry,
            presets,
            canvas,
            playback: PlaybackState::new(),
            session: Mutex::new(Session {
                song: None,
                tempo: None,
                sheet: ActionsSheet::new(),
            }),
            settings,
        })
    }

    /// Loads fixtures and presets named by the lighting configuration.
    pub fn from_config(config: &Lighting) -> Result<LightingSystem, SystemError> {
        let registry = match config.fixtures() {
            Some(path) => FixtureRegistry::load(path)?,
            None => {
                warn!("No fixtures configured, every action will be rejected.");
                FixtureRegistry::new()
            }
        };

        let mut presets = PresetLibrary::builtin();
        if let Some(path) = config.presets() {
            presets.extend(PresetLibrary::load(path)?);
        }

        let settings = SystemSettings {
            fps: config.fps()?,
            default_duration: config.default_song_duration()?.as_secs_f64(),
            auto_render: config.auto_render(),
            actions_dir: config.actions_dir().map(Path::to_path_buf),
        };
        info!(
            fixtures = registry.len(),
            presets = presets.names().count(),
            fps = settings.fps,
            "Lighting system ready."
        );
        Self::new(registry, presets, settings)
    }

    /// The canvas shared with the dispatcher.
    pub fn canvas(&self) -> CanvasHandle {
        self.canvas.clone()
    }

    /// The playback state shared with the dispatcher.
    pub fn playback(&self) -> PlaybackState {
        self.playback.clone()
    }

    pub fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    pub fn presets(&self) -> &PresetLibrary {
        &self.presets
    }

    pub fn song(&self) -> Option<String> {
        self.session.lock().song.clone()
    }

    pub fn tempo(&self) -> Option<Tempo> {
        self.session.lock().tempo
    }

    /// A copy of the current actions, in render order.
    pub fn actions(&self) -> Vec<ActionRecord> {
        self.session.lock().sheet.records().to_vec()
    }

    /// The universe the dispatcher would send at this time.
    pub fn frame_at(&self, time: f64) -> Universe {
        self.canvas.read().get_frame(time)
    }

    /// Switches to a song: resizes the canvas, loads the song's saved sheet if there is one,
    /// stops playback and renders. An invalid duration or tempo leaves the current song loaded.
    pub fn load_song(
        &self,
        name: &str,
        duration: Option<f64>,
        bpm: Option<f64>,
    ) -> Result<RenderReport, SystemError> {
        if !valid_song_name(name) {
            return Err(SystemError::SongName(name.to_string()));
        }
        let tempo = bpm.map(Tempo::new).transpose()?;
        let duration = duration.unwrap_or(self.settings.default_duration);
        let sheet = match self.sheet_path(name) {
            Some(path) => ActionsSheet::load(&path)?,
            None => ActionsSheet::new(),
        };

        let mut session = self.session.lock();
        let mut canvas = self.canvas.write();
        canvas.reset(self.settings.fps, duration)?;
        *session = Session {
            song: Some(name.to_string()),
            tempo,
            sheet,
        };
        self.playback.apply(SyncEvent {
            is_playing: false,
            current_time: 0.0,
        });
        info!(
            song = name,
            duration,
            bpm = ?bpm,
            actions = session.sheet.len(),
            "Song loaded."
        );
        Ok(self.replay(&session, &mut canvas))
    }

    /// Validates and adds an action. The canvas is re-rendered if auto render is on.
    pub fn add_action(&self, action: Action, id: Option<ActionId>) -> Result<ActionId, SystemError> {
        Ok(self.add(action, id)?.0)
    }

    /// Removes the selected actions and returns how many went.
    pub fn remove_actions(&self, selector: &Selector) -> usize {
        self.remove(selector).0
    }

    /// Clears the canvas and replays the whole sheet. The dispatcher is held off until the
    /// replay is done.
    pub fn render(&self) -> RenderReport {
        let session = self.session.lock();
        let mut canvas = self.canvas.write();
        self.replay(&session, &mut canvas)
    }

    /// Runs one `#...` command line.
    pub fn execute(&self, text: &str) -> Result<CommandOutcome, SystemError> {
        let command = parse_command(text)?;
        debug!(command = command.name(), "Executing lighting command.");

        let tempo = self.tempo();
        if let Some(action) = command.to_action(tempo, self.playback.current_time())? {
            let (id, report) = self.add(action, None)?;
            return Ok(CommandOutcome::Added { id, report });
        }
        Ok(match command {
            Command::Clear(selector) => {
                let (count, report) = self.remove(&selector);
                CommandOutcome::Removed { count, report }
            }
            _ => CommandOutcome::Rendered(self.render()),
        })
    }

    /// Applies a playback sync event from the transport.
    pub fn apply_sync(&self, event: SyncEvent) {
        self.playback.apply(event);
    }

    /// Writes a level straight into the canvas frame at `time`. The actions sheet is not
    /// touched, so the next render paints over it.
    pub fn override_channel(
        &self,
        fixture: &str,
        channel: &str,
        level: f64,
        time: f64,
    ) -> Result<(), SystemError> {
        let definition = self.registry.get(fixture)?;
        let out_of_range = |_| RenderError::LevelOutOfRange {
            channel: channel.to_string(),
            level,
        };
        let writes: Vec<ChannelWrite> = match definition.resolve(channel)? {
            ResolvedChannel::Coarse(address) => {
                vec![(address, level_to_dmx(level).map_err(out_of_range)?)]
            }
            ResolvedChannel::Fine { msb, lsb } => {
                let (high, low) = level_to_fine(level).map_err(out_of_range)?;
                vec![(msb, high), (lsb, low)]
            }
        };
        self.canvas.write().paint_frame(time, &writes)?;
        debug!(fixture, channel, level, time, "Channel overridden.");
        Ok(())
    }

    /// Writes the current sheet to the actions directory. Returns where it went, or None
    /// when no actions directory is configured.
    pub fn save(&self) -> Result<Option<PathBuf>, SystemError> {
        let session = self.session.lock();
        let song = session.song.as_deref().ok_or(SystemError::NoSong)?;
        let Some(path) = self.sheet_path(song) else {
            return Ok(None);
        };
        session.sheet.save(&path)?;
        Ok(Some(path))
    }

    fn add(
        &self,
        action: Action,
        id: Option<ActionId>,
    ) -> Result<(ActionId, Option<RenderReport>), SystemError> {
        let mut guard = self.session.lock();
        let session = &mut *guard;
        let context = RenderContext::for_canvas(&self.canvas.read(), session.tempo);
        let id = session
            .sheet
            .add(action, id, &self.renderer(), &context)?;
        Ok((id, self.after_change(session)))
    }

    fn remove(&self, selector: &Selector) -> (usize, Option<RenderReport>) {
        let mut session = self.session.lock();
        let count = session.sheet.remove(selector);
        (count, self.after_change(&session))
    }

    /// Persists the sheet and re-renders if configured to.
    fn after_change(&self, session: &Session) -> Option<RenderReport> {
        if let Some(path) = session.song.as_deref().and_then(|song| self.sheet_path(song)) {
            if let Err(e) = session.sheet.save(&path) {
                error!(err = %e, "Unable to save actions sheet.");
            }
        }
        if !self.settings.auto_render {
            return None;
        }
        Some(self.replay(session, &mut self.canvas.write()))
    }

    fn replay(&self, session: &Session, canvas: &mut Canvas) -> RenderReport {
        let context = RenderContext::for_canvas(canvas, session.tempo);
        session.sheet.render(&self.renderer(), &context, canvas)
    }

    fn renderer(&self) -> FixtureRenderer<'_> {
        FixtureRenderer::new(&self.registry, &self.presets)
    }

    fn sheet_path(&self, song: &str) -> Option<PathBuf> {
        self.settings
            .actions_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", song)))
    }
}

/// Song names become file names in the actions directory.
fn valid_song_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}
