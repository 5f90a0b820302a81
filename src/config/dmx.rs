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

use std::net::{IpAddr, SocketAddr};

use serde::Deserialize;

use super::ConfigError;
use crate::dmx::artnet::{ARTNET_PORT, MAX_PORT_ADDRESS};
use crate::dmx::dispatcher::DispatcherSettings;
use crate::dmx::thread_priority::MAX_PRIORITY;
use crate::dmx::universe::TARGET_HZ;

/// Art-Net broadcast unless a node address is given.
pub const DEFAULT_TARGET: &str = "255.255.255.255";
pub const DEFAULT_BIND: &str = "0.0.0.0:0";

/// A YAML representation of the DMX output configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Dmx {
    /// The Art-Net node or broadcast address.
    target: Option<String>,

    /// The UDP port on the target.
    port: Option<u16>,

    /// The 15-bit Art-Net port-address (net, sub-net and universe).
    universe: Option<u16>,

    /// Dispatcher ticks per second.
    fps: Option<f64>,

    /// Send all-zero frames while the song is stopped.
    blackout_when_not_playing: Option<bool>,

    /// The local address to send from.
    bind: Option<String>,

    /// Requested priority for the dispatcher thread, 0-99.
    thread_priority: Option<u8>,
}

impl Dmx {
    /// Gets the destination socket address.
    pub fn target(&self) -> Result<SocketAddr, ConfigError> {
        let target = self.target.as_deref().unwrap_or(DEFAULT_TARGET);
        let ip: IpAddr = target.parse().map_err(|_| ConfigError::Invalid {
            field: "dmx.target",
            value: target.to_string(),
            expected: "an IP address",
        })?;
        Ok(SocketAddr::new(ip, self.port.unwrap_or(ARTNET_PORT)))
    }

    /// Gets the local socket address to bind.
    pub fn bind(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or(DEFAULT_BIND);
        bind.parse().map_err(|_| ConfigError::Invalid {
            field: "dmx.bind",
            value: bind.to_string(),
            expected: "an address and port such as 0.0.0.0:0",
        })
    }

    pub fn universe(&self) -> Result<u16, ConfigError> {
        let universe = self.universe.unwrap_or(0);
        if universe > MAX_PORT_ADDRESS {
            return Err(ConfigError::Invalid {
                field: "dmx.universe",
                value: universe.to_string(),
                expected: "a port-address of at most 32767",
            });
        }
        Ok(universe)
    }

    pub fn fps(&self) -> Result<f64, ConfigError> {
        positive_fps("dmx.fps", self.fps)
    }

    pub fn blackout_when_not_playing(&self) -> bool {
        self.blackout_when_not_playing.unwrap_or(false)
    }

    pub fn thread_priority(&self) -> Result<Option<u8>, ConfigError> {
        match self.thread_priority {
            Some(priority) if priority > MAX_PRIORITY => Err(ConfigError::Invalid {
                field: "dmx.thread_priority",
                value: priority.to_string(),
                expected: "a priority of 0-99",
            }),
            priority => Ok(priority),
        }
    }

    /// Converts the configuration into dispatcher settings.
    pub fn dispatcher_settings(&self) -> Result<DispatcherSettings, ConfigError> {
        Ok(DispatcherSettings {
            fps: self.fps()?,
            blackout_when_not_playing: self.blackout_when_not_playing(),
            thread_priority: self.thread_priority()?,
        })
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.target()?;
        self.bind()?;
        self.universe()?;
        self.dispatcher_settings()?;
        Ok(())
    }
}

/// Reads an optional frame rate, defaulting to the DMX refresh rate.
pub(super) fn positive_fps(field: &'static str, fps: Option<f64>) -> Result<f64, ConfigError> {
    let fps = fps.unwrap_or(TARGET_HZ);
    if !fps.is_finite() || fps <= 0.0 {
        return Err(ConfigError::Invalid {
            field,
            value: fps.to_string(),
            expected: "a positive frame rate",
        });
    }
    Ok(fps)
}
