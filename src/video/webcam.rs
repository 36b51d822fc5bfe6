//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::{env, fmt};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    image::{Image, Resolution},
    timer::Timer,
};

use super::{CameraOptions, ParamPreference, VideoSource};

/// Environment variable forcing the device used by webcams opened without an explicit name.
pub const ENV_VAR_WEBCAM_NAME: &str = "MESHVIEW_WEBCAM_NAME";

/// A frame size and rate supported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameFormat {
    resolution: Resolution,
    fps: u32,
}

/// The constraints a [`FrameFormat`] should satisfy.
#[derive(Debug, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

impl FramePrefs {
    fn from_options(options: &CameraOptions) -> Self {
        Self {
            resolution: Some(options.requested_resolution()),
            fps: options.requested_fps(),
            pref: options.preference(),
        }
    }

    fn accepts(&self, fmt: &FrameFormat) -> bool {
        let res_ok = self.resolution.map_or(true, |res| {
            fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
        });
        let fps_ok = self.fps.map_or(true, |fps| fmt.fps >= fps);
        res_ok && fps_ok
    }

    /// Drops the constraint that matters least, returning `false` if there was none left.
    fn relax(&mut self) -> bool {
        match self.pref {
            ParamPreference::Resolution => {
                self.fps.take().is_some() || self.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                self.resolution.take().is_some() || self.fps.take().is_some()
            }
        }
    }
}

/// Picks the best of `formats` for `prefs`, returning its index.
///
/// Among the formats satisfying all constraints, the one closest to the requested resolution (or
/// frame rate, when [`ParamPreference::Framerate`] is used) wins, and the other parameter is
/// maximized. Parameters that are not constrained are maximized as well. When no format satisfies
/// the constraints, they are relaxed one at a time.
fn select_format(formats: &[FrameFormat], mut prefs: FramePrefs) -> Option<usize> {
    loop {
        let eligible = formats
            .iter()
            .enumerate()
            .filter(|(_, fmt)| prefs.accepts(fmt));
        let best = match prefs.pref {
            ParamPreference::Resolution => eligible.max_by_key(|(_, fmt)| {
                let pixels = fmt.resolution.num_pixels();
                (rank(pixels, prefs.resolution.is_some()), fmt.fps)
            }),
            ParamPreference::Framerate => eligible.max_by_key(|(_, fmt)| {
                let fps = u64::from(fmt.fps);
                (rank(fps, prefs.fps.is_some()), fmt.resolution.num_pixels())
            }),
        };
        if let Some((index, _)) = best {
            return Some(index);
        }

        log::debug!("no webcam format matches {:?}", prefs);
        if !prefs.relax() {
            return None;
        }
    }
}

/// Ranks a parameter so that the smallest value wins if it has a lower bound, and the largest
/// otherwise.
fn rank(value: u64, bounded: bool) -> i128 {
    if bounded {
        -i128::from(value)
    } else {
        i128::from(value)
    }
}

fn negotiate_format(device: &Device, prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    let mut intervals = Vec::new();
    let FrameSizes::Discrete(sizes) = device.frame_sizes(pixel_format)? else {
        bail!("stepwise or continuous resolutions are not supported");
    };
    for size in sizes {
        let FrameIntervals::Discrete(rates) =
            device.frame_intervals(pixel_format, size.width(), size.height())?
        else {
            bail!("stepwise or continuous frame rates are not supported");
        };
        for rate in rates {
            let interval = *rate.fract();
            formats.push(FrameFormat {
                resolution: Resolution::new(size.width(), size.height()),
                fps: (1.0 / interval.as_f32()).round() as u32,
            });
            intervals.push(interval);
        }
    }

    let Some(index) = select_format(&formats, prefs) else {
        bail!("failed to negotiate a webcam format");
    };
    let res = formats[index].resolution;
    Ok((
        PixFormat::new(res.width(), res.height(), pixel_format),
        intervals[index],
    ))
}

struct Stream {
    stream: ReadStream,
    resolution: Resolution,
}

/// A V4L2 webcam.
///
/// The device is acquired by [`VideoSource::open`]. Without a device name in the
/// [`CameraOptions`] or the `MESHVIEW_WEBCAM_NAME` environment variable, the first device
/// supporting a compatible format is used.
pub struct Webcam {
    stream: Option<Stream>,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Default for Webcam {
    fn default() -> Self {
        Self::new()
    }
}

impl Webcam {
    pub fn new() -> Self {
        Self {
            stream: None,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }
    }

    fn open_device(dev: Device, options: &CameraOptions) -> anyhow::Result<Option<Stream>> {
        let caps = dev.capabilities()?;
        let name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = options.device_name().or(name_from_env.as_deref()) {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );
        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, interval) = negotiate_format(&dev, FramePrefs::from_options(options))?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(interval)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        Ok(Some(Stream {
            stream: capture.into_stream()?,
            resolution,
        }))
    }
}

impl VideoSource for Webcam {
    fn open(&mut self, options: &CameraOptions) -> anyhow::Result<Resolution> {
        self.close();

        if let Ok(name) = env::var(ENV_VAR_WEBCAM_NAME) {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
        }
        for dev in linuxvideo::list()? {
            match dev {
                Ok(dev) => match Self::open_device(dev, options) {
                    Ok(Some(stream)) => {
                        let resolution = stream.resolution;
                        self.stream = Some(stream);
                        return Ok(resolution);
                    }
                    Ok(None) => {}
                    Err(e) => log::debug!("{e}"),
                },
                Err(e) => log::warn!("{e}"),
            }
        }

        bail!("no supported webcam device found")
    }

    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        let Some(stream) = &mut self.stream else {
            bail!("webcam is not open");
        };
        let resolution = stream.resolution;
        let t_decode = &self.t_decode;

        let dequeue_guard = self.t_dequeue.start();
        let image = stream.stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    // Webcams occasionally produce corrupted MJPG frames. Skipping them would
                    // double the latency of the next frame, so hand back a blank one instead.
                    log::error!("webcam decode error: {e}");
                    Image::new(resolution.width(), resolution.height())
                }
            };
            Ok(image)
        })?;
        Ok(Some(image))
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("closed webcam");
        }
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

impl fmt::Debug for Webcam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stream {
            Some(stream) => write!(f, "Webcam({})", stream.resolution),
            None => f.write_str("Webcam(closed)"),
        }
    }
}
