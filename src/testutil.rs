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

mod polling;

pub use polling::eventually;

use serde_json::{json, Value};

use crate::lighting::registry::FixtureRegistry;

/// An RGB par can: dim, red, green, blue from `base`, armed by dim at 255.
pub fn parcan_json(id: &str, base: u32) -> Value {
    json!({
        "id": id,
        "name": format!("Par {}", id),
        "type": "rgb",
        "channels": {
            "dim": base,
            "red": base + 1,
            "green": base + 2,
            "blue": base + 3,
        },
        "effects": ["set", "flash", "strobe", "fade", "full", "preset"],
        "arm": {"channel": "dim", "value": 255},
    })
}

/// A moving head with 16-bit pan/tilt, a dimmer and a color wheel.
pub fn moving_head_json(id: &str, base: u32) -> Value {
    json!({
        "id": id,
        "type": "moving_head",
        "channels": {
            "pan_msb": base,
            "pan_lsb": base + 1,
            "tilt_msb": base + 2,
            "tilt_lsb": base + 3,
            "dim": base + 4,
            "color": base + 5,
        },
        "effects": ["set", "fade", "seek", "flash", "full", "strobe"],
        "arm": {"channel": "dim", "value": 255},
        "meta": {
            "value_mappings": {
                "color": {"0": "white", "10": "red", "20": "blue"},
            },
            "position_constraints": {
                "pan": {"min": 10000, "max": 50000},
                "tilt": {"min": 5000, "max": 40000},
            },
        },
        "position": {"x": 0.0, "y": 4.5, "label": "center truss"},
    })
}

/// parcan_l at 1, parcan_r at 5 and a moving head at 20.
pub fn rig() -> FixtureRegistry {
    let raw = [
        parcan_json("parcan_l", 1),
        parcan_json("parcan_r", 5),
        moving_head_json("head", 20),
    ]
    .into_iter()
    .map(|json| serde_json::from_value(json).expect("test fixture json"))
    .collect();
    FixtureRegistry::from_raw(raw).expect("test rig")
}
