// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frames of the zoom.  Everything about a frame (how far in it is
//! zoomed, which part of the plane it shows, what it is called) is
//! derived from its index alone.

use crate::config::RenderRequest;
use crate::errors::Result;
use crate::planes::PlaneMapper;
use num::Complex;

/// How much narrower each frame is than the first, per frame.
pub const ZOOM_STEP: f64 = 0.1;

/// The scale of frame `index` when the zoom starts at `base_scale`.
#[inline]
pub fn scale_at(index: u32, base_scale: f64) -> f64 {
    base_scale / (1.0 + f64::from(index) * ZOOM_STEP)
}

/// A single frame's worth of work.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameTask {
    /// Zero-based position of the frame in the animation.
    pub frame_index: u32,
}

impl FrameTask {
    /// The task for frame `frame_index`.
    pub fn new(frame_index: u32) -> Self {
        FrameTask { frame_index }
    }

    /// Width and height of the region this frame shows.
    pub fn scale(&self, request: &RenderRequest) -> f64 {
        scale_at(self.frame_index, request.base_scale)
    }

    /// The mapping from this frame's raster to its square of the
    /// complex plane.
    pub fn plane(&self, request: &RenderRequest) -> Result<PlaneMapper> {
        PlaneMapper::centered(
            request.width,
            request.height,
            Complex::new(request.center_x, request.center_y),
            self.scale(request),
        )
    }
}

/// Produces output identifiers of the form `prefix_N.ext`, with N
/// counting from one.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameNamer {
    prefix: String,
    extension: String,
}

impl FrameNamer {
    /// A namer for `prefix` using the default `jpg` extension.
    pub fn new(prefix: &str) -> Self {
        FrameNamer::with_extension(prefix, "jpg")
    }

    /// A namer for `prefix` and `extension` (with or without the dot).
    pub fn with_extension(prefix: &str, extension: &str) -> Self {
        FrameNamer {
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// The extension every name ends in, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The output identifier of frame `index`.
    pub fn output_id(&self, index: u32) -> String {
        format!("{}_{}.{}", self.prefix, u64::from(index) + 1, self.extension)
    }

    /// Scale and output identifier of frame `index`.
    pub fn name_and_scale(&self, index: u32, base_scale: f64) -> (f64, String) {
        (scale_at(index, base_scale), self.output_id(index))
    }
}

/// Scale and `jpg` output identifier of frame `index`.
pub fn name_and_scale(index: u32, base_scale: f64, prefix: &str) -> (f64, String) {
    FrameNamer::new(prefix).name_and_scale(index, base_scale)
}
