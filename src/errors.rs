// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The error taxonomy shared by every stage of a render.

use failure::Fail;
use itertools::Itertools;
use std::io;
use std::time::Duration;

/// Everything that can go wrong between reading a configuration and
/// writing the last frame.
#[derive(Debug, Fail)]
pub enum RenderError {
    /// The request was rejected before any work started.
    #[fail(display = "invalid configuration: {}", _0)]
    Configuration(String),

    /// A thread or an output location could not be created.
    #[fail(display = "could not create {}: {}", what, cause)]
    Resource {
        /// What we were trying to create.
        what: String,
        /// The underlying OS error.
        #[cause]
        cause: io::Error,
    },

    /// The frame sink could not encode or store a frame.
    #[fail(display = "could not store {}: {}", output_id, cause)]
    Encode {
        /// The name of the frame that failed.
        output_id: String,
        /// The underlying I/O or encoder error.
        #[cause]
        cause: io::Error,
    },

    /// A worker heard nothing from the workers ahead of it for longer
    /// than allowed.
    #[fail(
        display = "worker {} gave up waiting for its turn after {:?} without progress ahead of it",
        process_id, waited
    )]
    HandoffTimeout {
        /// The worker that gave up.
        process_id: u32,
        /// How long the chain ahead had been silent.
        waited: Duration,
    },

    /// The worker ahead of this one went away without passing the token.
    #[fail(display = "worker {} lost its predecessor before its turn came", process_id)]
    HandoffLost {
        /// The worker left waiting.
        process_id: u32,
    },

    /// A worker or band thread terminated abnormally.
    #[fail(display = "{} exited abnormally: {}", what, reason)]
    PartialExit {
        /// The thread that died.
        what: String,
        /// The panic payload, if it was a string.
        reason: String,
    },

    /// The worker stopped early because the run was aborted.
    #[fail(display = "worker {} stopped: run was cancelled", process_id)]
    Cancelled {
        /// The worker that stopped.
        process_id: u32,
    },

    /// One or more workers failed; every failure is listed.
    #[fail(display = "{}", summary)]
    RunFailed {
        /// A one-line description of every failure.
        summary: String,
        /// The individual failures, in worker order.
        failures: Vec<RenderError>,
    },
}

impl RenderError {
    /// Collects worker failures into a single error.
    pub fn run_failed(failures: Vec<RenderError>) -> RenderError {
        let summary = format!(
            "{} worker(s) failed: {}",
            failures.len(),
            failures.iter().join("; ")
        );
        RenderError::RunFailed { summary, failures }
    }
}

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Turns the payload of a panicked thread into something printable.
pub(crate) fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
