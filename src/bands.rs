// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splitting a raster into horizontal bands, one per thread.

use crate::errors::{RenderError, Result};
use std::ops::Range;

/// A contiguous run of rows, `start` inclusive, `end` exclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RowBand {
    /// First row of the band.
    pub start: u32,
    /// One past the last row of the band.
    pub end: u32,
}

impl RowBand {
    /// Number of rows in the band.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// True if the band has no rows.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The rows of the band, in order.
    pub fn rows(&self) -> Range<u32> {
        self.start..self.end
    }
}

/// Cut `height` rows into bands of `height / threads` rows each; the
/// last band takes whatever is left over.  Asking for more threads
/// than rows gives one band per row.
pub fn compute_bands(height: u32, threads: u32) -> Result<Vec<RowBand>> {
    if threads == 0 {
        return Err(RenderError::Configuration(
            "a frame needs at least one thread".to_string(),
        ));
    }
    if height == 0 {
        return Err(RenderError::Configuration(
            "a frame needs at least one row".to_string(),
        ));
    }

    let count = threads.min(height);
    let size = height / count;
    Ok((0..count)
        .map(|i| RowBand {
            start: i * size,
            end: if i + 1 == count { height } else { (i + 1) * size },
        })
        .collect())
}
