// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Where finished frames go.  The scheduler only knows about the
//! FrameSink trait; ImageSink is the implementation that writes image
//! files to a directory.

use crate::errors::{RenderError, Result};
use crate::render::Raster;
use image::jpeg::JPEGEncoder;
use image::png::PNGEncoder;
use image::pnm::{PNMEncoder, PNMSubtype, SampleEncoding};
use image::ColorType;
use log::debug;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receives every finished frame exactly once, in frame order.
pub trait FrameSink: Sync {
    /// Called when a worker starts computing the frame that will be
    /// stored as `output_id`.  Does nothing unless overridden.
    fn started(&self, _output_id: &str) {}

    /// Persist `raster` under the name `output_id`.
    fn store(&self, output_id: &str, raster: &Raster) -> Result<()>;
}

/// The file formats ImageSink knows how to write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Baseline JPEG.
    Jpeg,
    /// PNG.
    Png,
    /// Binary PPM.
    Pnm,
}

impl OutputFormat {
    /// Pick a format from a file extension, with or without the dot.
    pub fn from_extension(extension: &str) -> Result<OutputFormat> {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "ppm" | "pnm" => Ok(OutputFormat::Pnm),
            other => Err(RenderError::Configuration(format!(
                "don't know how to write .{} files",
                other
            ))),
        }
    }
}

fn encode<W: Write>(format: OutputFormat, mut output: W, raster: &Raster) -> io::Result<()> {
    let bytes = raster.to_rgb8();
    let (width, height) = (raster.width(), raster.height());
    match format {
        OutputFormat::Jpeg => {
            JPEGEncoder::new(&mut output).encode(&bytes, width, height, ColorType::RGB(8))?
        }
        OutputFormat::Png => {
            PNGEncoder::new(&mut output).encode(&bytes, width, height, ColorType::RGB(8))?
        }
        OutputFormat::Pnm => PNMEncoder::new(&mut output)
            .with_subtype(PNMSubtype::Pixmap(SampleEncoding::Binary))
            .encode(&bytes[..], width, height, ColorType::RGB(8))?,
    }
    output.flush()
}

/// Writes each frame to `directory/output_id`, choosing the encoder
/// from the output id's extension.
#[derive(Debug)]
pub struct ImageSink {
    directory: PathBuf,
}

impl ImageSink {
    /// A sink writing into `directory`, which is created if needed.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<ImageSink> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|cause| RenderError::Resource {
            what: format!("output directory {}", directory.display()),
            cause,
        })?;
        Ok(ImageSink { directory })
    }

    /// The full path `output_id` will be written to.
    pub fn path_of(&self, output_id: &str) -> PathBuf {
        self.directory.join(output_id)
    }
}

impl FrameSink for ImageSink {
    fn store(&self, output_id: &str, raster: &Raster) -> Result<()> {
        let path = self.path_of(output_id);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let format = OutputFormat::from_extension(extension)?;
        let written = File::create(&path)
            .and_then(|file| encode(format, BufWriter::new(file), raster));
        written.map_err(|cause| RenderError::Encode {
            output_id: output_id.to_string(),
            cause,
        })?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}
