// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The RenderRequest holds every parameter of a run.  It is built
//! once, validated once, and afterwards only ever read.

use crate::errors::{RenderError, Result};

/// The most threads a single frame may be split across.
pub const MAX_THREADS: u32 = 64;

/// The most pixels a frame may have, 8192 x 8192.  A frame's raster
/// is four bytes a pixel and is allocated up front.
pub const MAX_PIXELS: u64 = 1 << 26;

/// The conventional length of a zoom.
pub const DEFAULT_FRAME_COUNT: u32 = 50;

/// The parameters of a zoom animation.  Once set, this object should
/// not be mutable.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderRequest {
    /// Real part of the zoom center.
    pub center_x: f64,
    /// Imaginary part of the zoom center.
    pub center_y: f64,
    /// Width of the complex region shown in the first frame.
    pub base_scale: f64,
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
    /// Iteration cap per pixel.
    pub max_iterations: u32,
    /// Number of frames in the animation.
    pub frame_count: u32,
    /// Number of sibling workers the frames are divided among.
    pub worker_processes: u32,
    /// Number of threads each frame is divided among.
    pub worker_threads: u32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        RenderRequest {
            center_x: 0.0,
            center_y: 0.0,
            base_scale: 4.0,
            width: 1000,
            height: 1000,
            max_iterations: 1000,
            frame_count: DEFAULT_FRAME_COUNT,
            worker_processes: 1,
            worker_threads: 1,
        }
    }
}

fn positive(value: u32, what: &str) -> Result<()> {
    if value == 0 {
        return Err(RenderError::Configuration(format!(
            "{} must be at least 1",
            what
        )));
    }
    Ok(())
}

impl RenderRequest {
    /// Checks every field.  Nothing downstream re-validates, so this
    /// must be called before a request is handed to the scheduler.
    pub fn validate(&self) -> Result<()> {
        if !self.center_x.is_finite() || !self.center_y.is_finite() {
            return Err(RenderError::Configuration(
                "the center must be a finite point".to_string(),
            ));
        }
        if !self.base_scale.is_finite() || self.base_scale <= 0.0 {
            return Err(RenderError::Configuration(format!(
                "the scale must be a positive number, not {}",
                self.base_scale
            )));
        }
        positive(self.width, "image width")?;
        positive(self.height, "image height")?;
        let pixels = u64::from(self.width) * u64::from(self.height);
        if pixels > MAX_PIXELS {
            return Err(RenderError::Configuration(format!(
                "a {}x{} frame has {} pixels, more than the limit of {}",
                self.width, self.height, pixels, MAX_PIXELS
            )));
        }
        positive(self.max_iterations, "the iteration count")?;
        positive(self.frame_count, "the frame count")?;
        positive(self.worker_processes, "the worker count")?;
        positive(self.worker_threads, "the thread count")?;
        if self.worker_threads > MAX_THREADS {
            return Err(RenderError::Configuration(format!(
                "thread count must be between 1 and {}",
                MAX_THREADS
            )));
        }
        Ok(())
    }
}
