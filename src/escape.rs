// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape-time test.  A point on the complex plane is fed back
//! into z = z² + c, starting from z = c, until either the orbit
//! leaves the circle of radius 2 or we run out of patience.

/// The square of the escape radius.
pub const ESCAPE_NORM_SQR: f64 = 4.0;

/// Return the number of iterations at point x, y in the Mandelbrot
/// space, up to a maximum of `max`.  A result equal to `max` means
/// the orbit never escaped; the caller decides what that looks like.
#[inline]
pub fn iterations_at(x: f64, y: f64, max: u32) -> u32 {
    let (x0, y0) = (x, y);
    let (mut x, mut y) = (x, y);
    let mut iter = 0;
    while x * x + y * y <= ESCAPE_NORM_SQR && iter < max {
        let xt = x * x - y * y + x0;
        let yt = 2.0 * x * y + y0;
        x = xt;
        y = yt;
        iter += 1;
    }
    iter
}
