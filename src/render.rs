// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The FrameRenderer computes one frame.  The raster is cut into
//! bands of rows, each band is handed to its own scoped thread as an
//! exclusive slice of the pixel buffer, and the frame is returned
//! only after every band has been joined.  No band ever sees another
//! band's rows, so there is nothing to lock.

use crate::bands::{compute_bands, RowBand};
use crate::color::{color_of, to_rgb, BACKGROUND};
use crate::config::RenderRequest;
use crate::errors::{panic_reason, RenderError, Result};
use crate::escape::iterations_at;
use crate::frames::FrameTask;
use crate::planes::{Pixel, PlaneMapper};
use crossbeam::thread::ScopedJoinHandle;
use itertools::iproduct;
use log::debug;
use std::mem;

/// A row-major grid of packed 0xRRGGBB colors.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Raster {
    /// A `width` by `height` raster painted entirely in `fill`.
    pub fn new(width: u32, height: u32, fill: u32) -> Self {
        Raster {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The color at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .cloned()
    }

    /// Every pixel, row by row.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Three bytes per pixel, red first, the layout every encoder
    /// wants.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 3);
        for &color in &self.pixels {
            bytes.extend_from_slice(&to_rgb(color));
        }
        bytes
    }

    /// Hands out one exclusive slice of the pixel buffer per band.
    /// The bands must tile the raster top to bottom.
    fn split_bands<'a>(&'a mut self, bands: &[RowBand]) -> Vec<(RowBand, &'a mut [u32])> {
        let width = self.width as usize;
        let mut rest: &'a mut [u32] = &mut self.pixels;
        let mut slices = Vec::with_capacity(bands.len());
        for band in bands {
            let (head, tail) = mem::take(&mut rest).split_at_mut(band.len() as usize * width);
            slices.push((*band, head));
            rest = tail;
        }
        slices
    }
}

/// Fill one band's slice of the raster.  `rows[0]` is the band's
/// first row.
fn render_band(plane: &PlaneMapper, band: RowBand, rows: &mut [u32], max: u32) {
    let width = plane.integral_plane.0;
    for (row, column) in iproduct!(band.rows(), 0..width) {
        let point = plane.pixel_to_point(&Pixel(column, row));
        let offset = (row - band.start) as usize * width as usize + column as usize;
        rows[offset] = color_of(iterations_at(point.re, point.im, max), max);
    }
}

/// Renders frames of a zoom.  Holds nothing but a reference to the
/// request, so one renderer can be shared by any number of callers.
#[derive(Copy, Clone, Debug)]
pub struct FrameRenderer<'a> {
    request: &'a RenderRequest,
}

impl<'a> FrameRenderer<'a> {
    /// A renderer for frames of `request`.
    pub fn new(request: &'a RenderRequest) -> Self {
        FrameRenderer { request }
    }

    /// Compute the whole raster of `task`, using `worker_threads`
    /// threads.  Either every row is computed or an error is
    /// returned; a partially drawn frame never escapes.
    pub fn render(&self, task: &FrameTask) -> Result<Raster> {
        let request = self.request;
        let plane = task.plane(request)?;
        let bands = compute_bands(request.height, request.worker_threads)?;
        let max = request.max_iterations;
        let mut raster = Raster::new(request.width, request.height, BACKGROUND);

        let slices = raster.split_bands(&bands);
        let plane = &plane;
        let outcome = crossbeam::scope(|spawner| -> Result<()> {
            let mut handles: Vec<(RowBand, ScopedJoinHandle<()>)> = vec![];
            for (band, rows) in slices {
                debug!(
                    "frame {}: rows {}..{} dispatched",
                    task.frame_index, band.start, band.end
                );
                let handle = spawner
                    .builder()
                    .name(format!("frame-{}-rows-{}", task.frame_index, band.start))
                    .spawn(move |_| render_band(plane, band, rows, max))
                    .map_err(|cause| RenderError::Resource {
                        what: format!("a thread for rows {}..{}", band.start, band.end),
                        cause,
                    })?;
                handles.push((band, handle));
            }

            for (band, handle) in handles {
                handle.join().map_err(|payload| RenderError::PartialExit {
                    what: format!("thread for rows {}..{}", band.start, band.end),
                    reason: panic_reason(payload),
                })?;
            }
            Ok(())
        });

        match outcome {
            Ok(result) => result?,
            Err(payload) => {
                return Err(RenderError::PartialExit {
                    what: format!("frame {}", task.frame_index),
                    reason: panic_reason(payload),
                })
            }
        }
        Ok(raster)
    }
}
