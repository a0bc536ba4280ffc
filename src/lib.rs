#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mandelbrot zoom renderer
//!
//! The Mandelbrot set is drawn by taking each point on the complex
//! plane, repeatedly squaring it and adding the original point back,
//! and counting how many steps it takes for the result to run off
//! towards infinity.  That count becomes the pixel's brightness;
//! points that never leave are painted black.
//!
//! A zoom is a sequence of such frames, each a little narrower than
//! the one before, all centered on the same point.  The work is split
//! twice: the frames are divided among a handful of sibling workers
//! that hand a single token down the line so their output lands in
//! frame order, and each frame is divided into bands of rows, one
//! per thread, that are computed side by side and joined before the
//! frame is stored.

pub mod bands;
pub mod color;
pub mod config;
pub mod errors;
pub mod escape;
pub mod frames;
pub mod planes;
pub mod render;
pub mod schedule;
pub mod store;
pub mod token;

pub use bands::{compute_bands, RowBand};
pub use color::color_of;
pub use config::RenderRequest;
pub use errors::{RenderError, Result};
pub use escape::iterations_at;
pub use frames::{name_and_scale, FrameNamer, FrameTask};
pub use render::{FrameRenderer, Raster};
pub use schedule::{assign_frames, FrameScheduler, HandoffPolicy, ProcessAssignment, RunReport};
pub use store::{FrameSink, ImageSink, OutputFormat};
