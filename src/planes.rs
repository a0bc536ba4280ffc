//! Contains the PlaneMapper struct, which describes a relationship
//! between a rectangle on the integral plane with an origin at 0,0,
//! and a rectangle on the complex plane with an arbitrary pair of
//! corners defining the leftlower and rightupper corners of the
//! region being rendered.
use crate::errors::{RenderError, Result};
use num::Complex;

/// Describes the width and height of an integral plane that is assumed to start at
/// 0,0 and all values are assumed to be non-negative integers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntegralPlane(pub u32, pub u32);

/// Describes the lower-left corner and upper-right corner of the
/// Complex plane, treating the real part of each value as the
/// x-component and the imaginary part of each value as the
/// y-component.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ComplexPlane(pub Complex<f64>, pub Complex<f64>);

/// Describes the column, row of a pixel in a raster.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pixel(pub u32, pub u32);

/// Maps pixels of a raster onto the region of the complex plane the
/// raster depicts.  Row 0 sits on the lower edge of the region.
#[derive(Debug)]
pub struct PlaneMapper {
    /// The size of the raster.
    pub integral_plane: IntegralPlane,
    /// The two coordinates defining the complex cartesian plane,
    /// left-lower and right-upper
    pub complex_plane: ComplexPlane,
    // The extent of the complex region, real then imaginary.
    span: (f64, f64),
}

impl PlaneMapper {
    /// Constructor.  Takes the raster size and two points describing
    /// the complex region.
    pub fn new(
        width: u32,
        height: u32,
        leftlower: Complex<f64>,
        rightupper: Complex<f64>,
    ) -> Result<PlaneMapper> {
        if width == 0 || height == 0 {
            return Err(RenderError::Configuration(format!(
                "cannot map a {}x{} raster",
                width, height
            )));
        }

        if rightupper.re < leftlower.re {
            return Err(RenderError::Configuration(
                "The left lower corner is not to the left of the right upper corner.".to_string(),
            ));
        }

        if rightupper.im < leftlower.im {
            return Err(RenderError::Configuration(
                "The left lower corner is not lower than the right upper corner".to_string(),
            ));
        }

        Ok(PlaneMapper {
            integral_plane: IntegralPlane(width, height),
            complex_plane: ComplexPlane(leftlower, rightupper),
            span: (rightupper.re - leftlower.re, rightupper.im - leftlower.im),
        })
    }

    /// The square region of side `scale` centered on `center`.
    pub fn centered(width: u32, height: u32, center: Complex<f64>, scale: f64) -> Result<PlaneMapper> {
        let half = scale / 2.0;
        PlaneMapper::new(
            width,
            height,
            Complex::new(center.re - half, center.im - half),
            Complex::new(center.re + half, center.im + half),
        )
    }

    /// The total number of points in the integral grid.  Used to
    /// calculate memory needs.
    pub fn len(&self) -> usize {
        self.integral_plane.0 as usize * self.integral_plane.1 as usize
    }

    /// Never true for a mapper built through `new`.
    pub fn is_empty(&self) -> bool {
        self.integral_plane.0 == 0 || self.integral_plane.1 == 0
    }

    /// Given a pixel on the integral cartesian plane, interpolate the
    /// point it stands for on the complex plane.  The arithmetic is
    /// kept in this exact order so every thread count produces the
    /// same bits.
    #[inline]
    pub fn pixel_to_point(&self, pixel: &Pixel) -> Complex<f64> {
        let origin = self.complex_plane.0;
        Complex::new(
            origin.re + f64::from(pixel.0) * self.span.0 / f64::from(self.integral_plane.0),
            origin.im + f64::from(pixel.1) * self.span.1 / f64::from(self.integral_plane.1),
        )
    }
}
