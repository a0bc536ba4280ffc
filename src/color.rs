// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Iteration counts to colors.  A plain linear gray ramp packed as
//! 0xRRGGBB; points that never escaped are painted black.

/// The brightest color in the ramp.
pub const WHITE: u32 = 0x00FF_FFFF;

/// The color of points inside the set, and of an untouched raster.
pub const BACKGROUND: u32 = 0;

/// Scale an iteration count into the gray ramp.  Anything that hit
/// the iteration cap is considered inside the set.
#[inline]
pub fn color_of(iterations: u32, max: u32) -> u32 {
    if iterations >= max {
        return BACKGROUND;
    }
    (u64::from(WHITE) * u64::from(iterations) / u64::from(max)) as u32
}

/// Unpack a 0xRRGGBB color into its three channels.
#[inline]
pub fn to_rgb(color: u32) -> [u8; 3] {
    [(color >> 16) as u8, (color >> 8) as u8, color as u8]
}
