//! Live face mesh visualization.
//!
//! This crate draws the landmarks of MediaPipe's [Face Mesh] onto camera frames: the triangulated
//! face surface, the contours of eyes, eyebrows, lips, and face oval, every individual landmark,
//! and the irises when iris refinement is enabled.
//!
//! Landmark estimation is not part of this crate. It is performed by a [`Landmarker`], which is
//! handed each frame and returns normalized landmark positions. The [`Annotator`] then draws the
//! frame and the [`topology`] of the first face onto a [`Surface`].
//!
//! # Environment Variables
//!
//! * `MESHVIEW_WEBCAM_NAME`: Forces the device to use for webcams opened without an explicit
//!   device name. If unset, the first device that supports a compatible image format will be used.
//! * `RUST_LOG`: Overrides the log levels set by [`init_logger!`].
//!
//! [Face Mesh]: https://google.github.io/mediapipe/solutions/face_mesh.html
//! [`Landmarker`]: model::Landmarker
//! [`Annotator`]: annotate::Annotator
//! [`Surface`]: annotate::Surface
//! [`topology`]: face::topology

use log::LevelFilter;

pub mod annotate;
pub mod drop;
pub mod error;
pub mod face;
pub mod image;
pub mod landmark;
pub mod model;
pub mod session;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level. Other crates only log warnings and errors.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
