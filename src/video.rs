//! Video capture.
//!
//! A [`VideoSource`] produces a stream of frames. A [`Camera`] drives a source from a background
//! thread and hands every frame to a callback.

mod capture;
mod sequence;
#[cfg(target_os = "linux")]
pub mod webcam;

use crate::{
    image::{Image, Resolution},
    timer::Timer,
};

pub use capture::Camera;
pub use sequence::ImageSequence;

/// Indicates whether to prefer a higher resolution or frame rate when a source cannot deliver
/// both.
///
/// By default, [`ParamPreference::Resolution`] is used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

/// Options used when opening a [`VideoSource`].
#[derive(Debug, Clone)]
pub struct CameraOptions {
    name: Option<String>,
    resolution: Resolution,
    fps: Option<u32>,
    pref: ParamPreference,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            name: None,
            resolution: Resolution::RES_VGA,
            fps: None,
            pref: ParamPreference::default(),
        }
    }
}

impl CameraOptions {
    /// Sets the name of the device to open.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired frame resolution.
    ///
    /// The default is 640x480. Sources may deliver a different resolution if they cannot provide
    /// the requested one.
    #[inline]
    pub fn resolution(self, resolution: impl Into<Resolution>) -> Self {
        Self {
            resolution: resolution.into(),
            ..self
        }
    }

    /// Sets the desired frame rate.
    #[inline]
    pub fn fps(self, fps: u32) -> Self {
        Self {
            fps: Some(fps),
            ..self
        }
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    #[inline]
    pub fn prefer(self, pref: ParamPreference) -> Self {
        Self { pref, ..self }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn requested_resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn requested_fps(&self) -> Option<u32> {
        self.fps
    }

    pub fn preference(&self) -> ParamPreference {
        self.pref
    }
}

/// A source of video frames, like a webcam.
pub trait VideoSource {
    /// Acquires the underlying device and prepares it for capture.
    ///
    /// Returns the resolution of the frames that will be produced. This may block for a
    /// significant amount of time while the device initializes.
    fn open(&mut self, options: &CameraOptions) -> anyhow::Result<Resolution>;

    /// Reads the next frame, blocking until one is available.
    ///
    /// Returns `Ok(None)` once the source has no more frames to deliver.
    fn read(&mut self) -> anyhow::Result<Option<Image>>;

    /// Releases the underlying device.
    ///
    /// Calling this on a source that isn't open does nothing.
    fn close(&mut self);

    /// Returns the profiling timers of this source, logged periodically by the capture thread.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn open(&mut self, options: &CameraOptions) -> anyhow::Result<Resolution> {
        (**self).open(options)
    }

    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = CameraOptions::default();
        assert_eq!(options.requested_resolution(), Resolution::RES_VGA);
        assert_eq!(options.requested_fps(), None);
        assert_eq!(options.device_name(), None);
        assert_eq!(options.preference(), ParamPreference::Resolution);
    }

    #[test]
    fn builder() {
        let options = CameraOptions::default()
            .name("Integrated Camera")
            .resolution((1280, 720))
            .fps(30)
            .prefer(ParamPreference::Framerate);
        assert_eq!(options.device_name(), Some("Integrated Camera"));
        assert_eq!(options.requested_resolution(), Resolution::RES_720P);
        assert_eq!(options.requested_fps(), Some(30));
        assert_eq!(options.preference(), ParamPreference::Framerate);
    }
}
