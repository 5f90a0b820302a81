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
use clap::{crate_version, Parser, Subcommand};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cuecanvas::config::EngineConfig;
use cuecanvas::console::Console;
use cuecanvas::dmx::{ArtNetSender, Dispatcher};
use cuecanvas::lighting::registry::FixtureRegistry;
use cuecanvas::lighting::tempo::{parse_time_literal, TimeLiteral};
use cuecanvas::lighting::LightingSystem;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=cuecanvas lighting engine
After=network-online.target

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/cuecanvas
ExecStart=/usr/local/bin/cuecanvas start "$CUECANVAS_CONFIG" "$SONG"

[Install]
WantedBy=multi-user.target
Alias=cuecanvas.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Renders timed lighting actions and streams them over Art-Net."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists and verifies the fixture definitions in a file or directory.
    Fixtures {
        /// A fixture definition file or a directory of them.
        path: String,
    },
    /// Renders a song's saved actions sheet and optionally prints one frame.
    Render {
        /// The path to the engine config.
        config_path: String,
        /// The name of the song.
        song: String,
        /// The song duration, e.g. 3m30s. Defaults to the configured song duration.
        #[arg(short, long)]
        duration: Option<String>,
        /// The song tempo, needed for beat times.
        #[arg(short, long)]
        bpm: Option<f64>,
        /// Prints the DMX frame at this time.
        #[arg(short, long)]
        at: Option<String>,
    },
    /// Starts the engine: streams the song's canvas over Art-Net and reads commands from stdin.
    Start {
        /// The path to the engine config.
        config_path: String,
        /// The name of the song.
        song: String,
        /// The song duration, e.g. 3m30s. Defaults to the configured song duration.
        #[arg(short, long)]
        duration: Option<String>,
        /// The song tempo, needed for beat times.
        #[arg(short, long)]
        bpm: Option<f64>,
    },
    /// Converts a time literal such as 1m23.45s or 8b to seconds.
    ParseTime {
        /// The time literal.
        literal: String,
        /// The tempo for beat literals.
        #[arg(short, long)]
        bpm: Option<f64>,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fixtures { path } => {
            let registry = FixtureRegistry::load(&PathBuf::from(&path))?;

            if registry.is_empty() {
                println!("No fixtures found in {}.", path);
                return Ok(());
            }

            println!("Fixtures (count: {}):", registry.len());
            for fixture in registry.iter() {
                println!("- {}", fixture);
                if let Some(position) = fixture.position() {
                    println!("  at {}", position);
                }
            }

            let overlaps = registry.overlaps();
            if !overlaps.is_empty() {
                println!("\nShared addresses (count: {}):", overlaps.len());
                for (address, fixtures) in overlaps {
                    println!("- {}: {}", address, fixtures.join(", "));
                }
            }
        }
        Commands::Render {
            config_path,
            song,
            duration,
            bpm,
            at,
        } => {
            let engine_config = EngineConfig::load(Path::new(&config_path))?;
            let system = LightingSystem::from_config(engine_config.lighting())?;
            let duration = parse_time(duration.as_deref(), bpm)?;
            let report = system.load_song(&song, duration, bpm)?;
            println!("Rendered {}: {}", song, report);

            if let Some(time) = parse_time(at.as_deref(), bpm)? {
                print_frame(&system, time);
            }
        }
        Commands::Start {
            config_path,
            song,
            duration,
            bpm,
        } => {
            let engine_config = EngineConfig::load(Path::new(&config_path))?;
            let system = Arc::new(LightingSystem::from_config(engine_config.lighting())?);
            let duration = parse_time(duration.as_deref(), bpm)?;
            let report = system.load_song(&song, duration, bpm)?;
            println!("Loaded {}: {}", song, report);

            let dmx = engine_config.dmx();
            let sender = ArtNetSender::new(dmx.bind()?, dmx.target()?, dmx.universe()?)?;
            let mut dispatcher = Dispatcher::start(
                dmx.dispatcher_settings()?,
                system.canvas(),
                system.playback(),
                sender,
            )?;

            let interrupted = tokio::select! {
                result = Console::new(Arc::clone(&system)).spawn() => {
                    result??;
                    false
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    true
                }
            };
            dispatcher.stop();
            if interrupted {
                info!("Interrupted, dispatcher stopped.");
                // The console is still blocked reading stdin and would hold up runtime shutdown.
                process::exit(0);
            }
        }
        Commands::ParseTime { literal, bpm } => {
            let parsed: TimeLiteral = literal.parse()?;
            println!("{} = {}s", parsed, parse_time_literal(&literal, bpm)?);
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}

fn parse_time(text: Option<&str>, bpm: Option<f64>) -> Result<Option<f64>, Box<dyn Error>> {
    Ok(text.map(|text| parse_time_literal(text, bpm)).transpose()?)
}

/// Prints the non-zero channels of a frame, named by the fixtures patched there.
fn print_frame(system: &LightingSystem, time: f64) {
    let frame = system.frame_at(time);
    let mut names: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for fixture in system.registry().iter() {
        for (channel, address) in fixture.addresses() {
            let Some(value) = frame.channel(*address) else {
                continue;
            };
            let mut name = format!("{}.{}", fixture.id(), channel);
            if let Some(kind) = fixture.kind(channel) {
                name.push_str(&format!(" [{}]", kind));
            }
            if let Some(label) = fixture.value_label(channel, value) {
                name.push_str(&format!(" {}", label));
            }
            names.entry(*address).or_default().push(name);
        }
    }

    println!("Frame at {}s:", time);
    for (index, value) in frame.as_slice().iter().enumerate() {
        if *value == 0 {
            continue;
        }
        let address = index as u16 + 1;
        let patched = names
            .get(&address)
            .map(|names| names.join(", "))
            .unwrap_or_default();
        println!("- {:>3}: {:>3} {}", address, value, patched);
    }
}
