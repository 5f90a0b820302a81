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

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, span, warn, Level};

use crate::lighting::system::LightingSystem;
use crate::lighting::tempo::parse_time_literal;
use crate::playsync::SyncEvent;

const PLAY: &str = "play";
const STOP: &str = "stop";
const SEEK: &str = "seek";
const ACTIONS: &str = "actions";
const SAVE: &str = "save";
const STATUS: &str = "status";

/// Reads lighting commands and transport events line by line. Lines starting with `#` are
/// lighting commands; `play [<time>]`, `stop [<time>]` and `seek <time>` stand in for
/// the transport's sync events.
pub struct Console {
    system: Arc<LightingSystem>,
}

impl Console {
    pub fn new(system: Arc<LightingSystem>) -> Console {
        Console { system }
    }

    /// Reads stdin on a blocking task until end of input.
    pub fn spawn(self) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "console");
            let _enter = span.enter();

            info!("Console started.");
            while self.monitor_io(io::stdin().lock(), io::stdout())? {}
            info!("Console input closed.");
            Ok(())
        })
    }

    /// Handles one line of input. Returns false once the reader is exhausted.
    fn monitor_io<R, W>(&self, mut reader: R, mut writer: W) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }
        self.handle_line(input.trim(), &mut writer)?;
        writer.flush()?;
        Ok(true)
    }

    pub fn handle_line<W: io::Write>(&self, line: &str, writer: &mut W) -> Result<(), io::Error> {
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with('#') {
            return match self.system.execute(line) {
                Ok(outcome) => writeln!(writer, "{}", outcome),
                Err(e) => {
                    warn!(input = line, err = %e, "Command rejected.");
                    writeln!(writer, "error: {}", e)
                }
            };
        }

        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_lowercase();
        let argument = words.next();
        let playback = self.system.playback();
        match verb.as_str() {
            PLAY => self.sync(true, argument, writer),
            STOP => self.sync(false, argument, writer),
            SEEK if argument.is_some() => self.sync(playback.is_playing(), argument, writer),
            ACTIONS => {
                for record in self.system.actions() {
                    writeln!(writer, "{}", record)?;
                }
                Ok(())
            }
            SAVE => match self.system.save() {
                Ok(Some(path)) => writeln!(writer, "saved to {}", path.display()),
                Ok(None) => writeln!(writer, "no actions directory configured"),
                Err(e) => writeln!(writer, "error: {}", e),
            },
            STATUS => {
                let position = playback.snapshot();
                writeln!(
                    writer,
                    "{} {} at {:.2}s",
                    self.system.song().as_deref().unwrap_or("(no song)"),
                    if position.is_playing { "playing" } else { "stopped" },
                    position.current_time
                )
            }
            _ => {
                warn!(input = line, "Unrecognized input");
                writeln!(
                    writer,
                    "unrecognized input, expected #<command>, {}, {}, {}, {}, {} or {}",
                    PLAY, STOP, SEEK, ACTIONS, SAVE, STATUS
                )
            }
        }
    }

    /// Applies a sync event at the given time, or at the current position if none is given.
    fn sync<W: io::Write>(
        &self,
        is_playing: bool,
        argument: Option<&str>,
        writer: &mut W,
    ) -> Result<(), io::Error> {
        let current_time = match argument {
            Some(text) => {
                let bpm = self.system.tempo().map(|tempo| tempo.bpm());
                match parse_time_literal(text, bpm) {
                    Ok(time) => time,
                    Err(e) => return writeln!(writer, "error: {}", e),
                }
            }
            None => self.system.playback().current_time(),
        };
        self.system.apply_sync(SyncEvent {
            is_playing,
            current_time,
        });
        writeln!(
            writer,
            "{} at {:.2}s",
            if is_playing { "playing" } else { "stopped" },
            current_time
        )
    }
}

#[cfg(test)]
mod test {
    use std::io::BufReader;

    use super::*;
    use crate::lighting::effects::PresetLibrary;
    use crate::lighting::system::SystemSettings;
    use crate::testutil::rig;

    fn console() -> Console {
        let system = LightingSystem::new(
            rig(),
            PresetLibrary::builtin(),
            SystemSettings {
                fps: 44.0,
                default_duration: 60.0,
                auto_render: true,
                actions_dir: None,
            },
        )
        .unwrap();
        system.load_song("test", None, Some(120.0)).unwrap();
        Console::new(Arc::new(system))
    }

    fn run(console: &Console, input: &str) -> String {
        let mut output: Vec<u8> = Vec::new();
        let mut reader = BufReader::new(input.as_bytes());
        while console.monitor_io(&mut reader, &mut output).unwrap() {}
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_transport_events() {
        let console = console();
        let playback = console.system.playback();

        run(&console, "play 4b\n");
        assert!(playback.is_playing());
        assert!(playback.current_time() >= 2.0);

        run(&console, "stop 10\n");
        assert!(!playback.is_playing());
        assert_eq!(playback.current_time(), 10.0);

        run(&console, "seek 1m\n");
        assert!(!playback.is_playing());
        assert_eq!(playback.current_time(), 60.0);

        let output = run(&console, "seek soon\nstatus\n");
        assert!(output.starts_with("error:"), "{}", output);
        assert!(output.contains("test stopped at 60.00s"), "{}", output);
    }

    #[test]
    fn test_lighting_commands() {
        let console = console();
        let output = run(
            &console,
            "#add flash to parcan_l at 5 for 1\n\n#add flash to ghost at 1\nactions\n",
        );
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("added action #0"), "{}", output);
        assert!(lines[1].starts_with("error:"), "{}", output);
        assert!(lines[2].starts_with("#0 flash on parcan_l at 5s"), "{}", output);
        assert_eq!(console.system.frame_at(5.0).channel(2), Some(255));

        let output = run(&console, "#clear all\nactions\nbogus\n");
        assert!(output.starts_with("removed 1 action(s)"), "{}", output);
        assert!(output.contains("unrecognized input"), "{}", output);
        assert!(console.system.frame_at(5.0).is_blackout());
    }
}
