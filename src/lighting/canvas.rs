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

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::dmx::universe::{slot, Universe, TARGET_HZ};

/// The default canvas length when no song duration is known.
pub const DEFAULT_DURATION_SECS: f64 = 300.0;

/// The default number of frames per second.
pub const DEFAULT_FPS: f64 = TARGET_HZ;

/// Absorbs float noise when quantizing times onto the frame grid, so that
/// e.g. 6.0 * 44 lands on frame 264 and not 263.
const GRID_EPSILON: f64 = 1e-9;

/// A channel write: 1-based DMX address and value.
pub type ChannelWrite = (u16, u8);

/// A shared handle to the one canvas owned by the lighting system. Readers
/// take the read lock per frame, a full render holds the write lock for the
/// whole clear and replay.
pub type CanvasHandle = Arc<RwLock<Canvas>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanvasError {
    #[error("canvas fps must be positive, got {0}")]
    InvalidFps(f64),
    #[error("canvas duration must be positive, got {0}")]
    InvalidDuration(f64),
    #[error("unable to allocate a canvas of {0} frames")]
    Allocation(usize),
    #[error("channel {0} is outside of 1-512")]
    ChannelOutOfRange(u16),
    #[error("time {0} is not a valid canvas time")]
    InvalidTime(f64),
    #[error("range ends at {end}s before it starts at {start}s")]
    InvertedRange { start: f64, end: f64 },
}

/// The timeline buffer: one universe per frame covering the whole song.
#[derive(Clone, PartialEq)]
pub struct Canvas {
    fps: f64,
    duration: f64,
    frames: Vec<Universe>,
}

impl Canvas {
    /// Allocates a zeroed canvas of ceil(duration * fps) frames.
    pub fn new(fps: f64, duration: f64) -> Result<Canvas, CanvasError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CanvasError::InvalidFps(fps));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(CanvasError::InvalidDuration(duration));
        }

        let frame_count = (duration * fps - GRID_EPSILON).ceil().max(1.0) as usize;
        let mut frames = Vec::new();
        frames
            .try_reserve_exact(frame_count)
            .map_err(|_| CanvasError::Allocation(frame_count))?;
        frames.resize(frame_count, Universe::blackout());

        Ok(Canvas {
            fps,
            duration,
            frames,
        })
    }

    /// Shares this canvas behind a lock.
    pub fn into_handle(self) -> CanvasHandle {
        Arc::new(RwLock::new(self))
    }

    /// Reallocates the canvas for a new song. The current contents are kept
    /// if the new dimensions are rejected.
    pub fn reset(&mut self, fps: f64, duration: f64) -> Result<(), CanvasError> {
        *self = Canvas::new(fps, duration)?;
        debug!(
            fps,
            duration,
            frames = self.frames.len(),
            "Canvas reallocated."
        );
        Ok(())
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The timestamp of the given frame.
    pub fn frame_time(&self, index: usize) -> f64 {
        index as f64 / self.fps
    }

    /// Zeroes every frame in place.
    pub fn clear(&mut self) {
        self.frames.iter_mut().for_each(Universe::clear);
    }

    /// Writes the channel values into the frame the time falls in. Times past
    /// the end of the canvas are dropped.
    pub fn paint_frame(&mut self, time: f64, writes: &[ChannelWrite]) -> Result<(), CanvasError> {
        check_time(time)?;
        let indexes = check_writes(writes)?;

        let frame = (time * self.fps + GRID_EPSILON).floor() as usize;
        match self.frames.get_mut(frame) {
            Some(universe) => {
                apply(universe, &indexes);
            }
            None => debug!(time, "Dropping paint past the end of the canvas."),
        }
        Ok(())
    }

    /// Writes the channel values into every frame whose timestamp falls in
    /// [start, end).
    pub fn paint_range(
        &mut self,
        start: f64,
        end: f64,
        writes: &[ChannelWrite],
    ) -> Result<(), CanvasError> {
        let frames = self.frame_span(start, end)?;
        let indexes = check_writes(writes)?;

        for universe in &mut self.frames[frames] {
            apply(universe, &indexes);
        }
        Ok(())
    }

    /// Evaluates `value_fn` at every frame timestamp in [start, end) and writes
    /// the result to the channel.
    pub fn paint_channel<F>(
        &mut self,
        channel: u16,
        start: f64,
        end: f64,
        mut value_fn: F,
    ) -> Result<(), CanvasError>
    where
        F: FnMut(f64) -> u8,
    {
        let frames = self.frame_span(start, end)?;
        let index = slot(channel).ok_or(CanvasError::ChannelOutOfRange(channel))?;

        let fps = self.fps;
        for frame in frames {
            let value = value_fn(frame as f64 / fps);
            self.frames[frame].set_slot(index, value);
        }
        Ok(())
    }

    /// Returns the universe at the frame nearest the given time. Out of range
    /// times are clamped onto the canvas, this never fails.
    pub fn get_frame(&self, time: f64) -> Universe {
        let last = self.frames.len().saturating_sub(1);
        let frame = if time.is_nan() || time <= 0.0 {
            0
        } else {
            ((time * self.fps + GRID_EPSILON).floor() as usize).min(last)
        };
        self.frames.get(frame).copied().unwrap_or_default()
    }

    /// Returns the range of frame indexes with timestamps in [start, end).
    fn frame_span(&self, start: f64, end: f64) -> Result<std::ops::Range<usize>, CanvasError> {
        check_time(start)?;
        if end.is_nan() {
            return Err(CanvasError::InvalidTime(end));
        }
        if end < start {
            return Err(CanvasError::InvertedRange { start, end });
        }

        let len = self.frames.len();
        let first = ((start * self.fps - GRID_EPSILON).ceil() as usize).min(len);
        let last = if end.is_infinite() {
            len
        } else {
            ((end * self.fps - GRID_EPSILON).ceil() as usize).min(len)
        };
        Ok(first..last.max(first))
    }
}

fn check_time(time: f64) -> Result<(), CanvasError> {
    if time.is_finite() && time >= 0.0 {
        Ok(())
    } else {
        Err(CanvasError::InvalidTime(time))
    }
}

/// Validates all addresses up front so a bad write never half-applies.
fn check_writes(writes: &[ChannelWrite]) -> Result<Vec<(usize, u8)>, CanvasError> {
    writes
        .iter()
        .map(|(channel, value)| {
            slot(*channel)
                .map(|index| (index, *value))
                .ok_or(CanvasError::ChannelOutOfRange(*channel))
        })
        .collect()
}

fn apply(universe: &mut Universe, writes: &[(usize, u8)]) {
    for (index, value) in writes {
        universe.set_slot(*index, *value);
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("fps", &self.fps)
            .field("duration", &self.duration)
            .field("frames", &self.frames.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_canvas_size() {
        let canvas = Canvas::new(44.0, 300.0).unwrap();
        assert_eq!(canvas.frame_count(), 13200);
        assert!(canvas.get_frame(0.0).is_blackout());
        assert!(canvas.get_frame(299.99).is_blackout());

        let canvas = Canvas::new(44.0, 1.01).unwrap();
        assert_eq!(canvas.frame_count(), 45);
    }

    #[test]
    fn test_invalid_dimensions() {
        assert_eq!(Canvas::new(0.0, 10.0), Err(CanvasError::InvalidFps(0.0)));
        assert_eq!(
            Canvas::new(44.0, -1.0),
            Err(CanvasError::InvalidDuration(-1.0))
        );
    }

    #[test]
    fn test_reset_keeps_canvas_on_error() {
        let mut canvas = Canvas::new(44.0, 10.0).unwrap();
        canvas.paint_frame(1.0, &[(1, 200)]).unwrap();

        assert!(canvas.reset(44.0, 0.0).is_err());
        assert_eq!(canvas.frame_count(), 440);
        assert_eq!(canvas.get_frame(1.0).channel(1), Some(200));

        canvas.reset(20.0, 5.0).unwrap();
        assert_eq!(canvas.frame_count(), 100);
        assert!(canvas.get_frame(1.0).is_blackout());
    }

    #[test]
    fn test_paint_frame_quantizes() {
        let mut canvas = Canvas::new(44.0, 10.0).unwrap();
        canvas.paint_frame(1.0, &[(1, 255), (512, 7)]).unwrap();

        assert_eq!(canvas.get_frame(1.0).channel(1), Some(255));
        assert_eq!(canvas.get_frame(1.0).channel(512), Some(7));
        // Anything inside the same 1/44s frame reads the same universe.
        assert_eq!(canvas.get_frame(1.01).channel(1), Some(255));
        assert_eq!(canvas.get_frame(1.03).channel(1), Some(0));
        assert_eq!(canvas.get_frame(0.99).channel(1), Some(0));
    }

    #[test]
    fn test_paint_rejects_bad_channels() {
        let mut canvas = Canvas::new(44.0, 10.0).unwrap();
        assert_eq!(
            canvas.paint_frame(1.0, &[(1, 255), (513, 1)]),
            Err(CanvasError::ChannelOutOfRange(513))
        );
        // Nothing was written by the rejected call.
        assert!(canvas.get_frame(1.0).is_blackout());
        assert_eq!(
            canvas.paint_range(0.0, 1.0, &[(0, 1)]),
            Err(CanvasError::ChannelOutOfRange(0))
        );
    }

    #[test]
    fn test_paint_range_half_open() {
        let mut canvas = Canvas::new(44.0, 10.0).unwrap();
        canvas.paint_range(2.0, 3.0, &[(5, 100)]).unwrap();

        assert_eq!(canvas.get_frame(1.99).channel(5), Some(0));
        assert_eq!(canvas.get_frame(2.0).channel(5), Some(100));
        assert_eq!(canvas.get_frame(2.99).channel(5), Some(100));
        assert_eq!(canvas.get_frame(3.0).channel(5), Some(0));
    }

    #[test]
    fn test_paint_range_inverted() {
        let mut canvas = Canvas::new(44.0, 10.0).unwrap();
        assert_eq!(
            canvas.paint_range(3.0, 2.0, &[(5, 100)]),
            Err(CanvasError::InvertedRange {
                start: 3.0,
                end: 2.0
            })
        );
        // An empty range is fine and paints nothing.
        canvas.paint_range(2.0, 2.0, &[(5, 100)]).unwrap();
        assert_eq!(canvas.get_frame(2.0).channel(5), Some(0));
    }

    #[test]
    fn test_paint_range_clipped_to_canvas() {
        let mut canvas = Canvas::new(44.0, 2.0).unwrap();
        canvas.paint_range(1.5, 100.0, &[(1, 9)]).unwrap();
        assert_eq!(canvas.get_frame(1.99).channel(1), Some(9));
        canvas.paint_frame(50.0, &[(2, 9)]).unwrap();
    }

    #[test]
    fn test_paint_channel_ramp() {
        let mut canvas = Canvas::new(10.0, 10.0).unwrap();
        canvas
            .paint_channel(3, 0.0, 1.0, |t| (t * 100.0).round() as u8)
            .unwrap();

        assert_eq!(canvas.get_frame(0.0).channel(3), Some(0));
        assert_eq!(canvas.get_frame(0.5).channel(3), Some(50));
        assert_eq!(canvas.get_frame(0.9).channel(3), Some(90));
        assert_eq!(canvas.get_frame(1.0).channel(3), Some(0));
    }

    #[test]
    fn test_get_frame_clamps() {
        let mut canvas = Canvas::new(44.0, 2.0).unwrap();
        canvas.paint_frame(0.0, &[(1, 1)]).unwrap();
        canvas.paint_frame(1.99, &[(1, 2)]).unwrap();

        assert_eq!(canvas.get_frame(-5.0).channel(1), Some(1));
        assert_eq!(canvas.get_frame(f64::NAN).channel(1), Some(1));
        assert_eq!(canvas.get_frame(1000.0).channel(1), Some(2));
        assert_eq!(canvas.get_frame(f64::INFINITY).channel(1), Some(2));
    }

    #[test]
    fn test_clear() {
        let mut canvas = Canvas::new(44.0, 2.0).unwrap();
        canvas.paint_range(0.0, 2.0, &[(1, 1), (2, 2)]).unwrap();
        canvas.clear();
        assert_eq!(canvas.frame_count(), 88);
        assert!((0..88).all(|i| canvas.get_frame(canvas.frame_time(i)).is_blackout()));
    }
}
