use std::{
    fmt, fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};

use crate::{
    image::{Image, Resolution},
    timer::Timer,
};

use super::{CameraOptions, VideoSource};

const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

enum Frames {
    Files(Vec<PathBuf>),
    Images(Vec<Image>),
}

impl Frames {
    fn len(&self) -> usize {
        match self {
            Frames::Files(paths) => paths.len(),
            Frames::Images(images) => images.len(),
        }
    }

    fn load(&self, index: usize, t_decode: &Timer) -> anyhow::Result<Image> {
        match self {
            Frames::Files(paths) => {
                let path = &paths[index];
                t_decode
                    .time(|| Image::load(path))
                    .with_context(|| format!("failed to load frame '{}'", path.display()))
            }
            Frames::Images(images) => Ok(images[index].clone()),
        }
    }
}

/// A [`VideoSource`] that plays back a sequence of still images.
///
/// Frames are delivered at their native resolution. If a frame rate was requested via
/// [`CameraOptions::fps`], playback is paced to match it; otherwise frames are produced as fast as
/// they can be loaded.
pub struct ImageSequence {
    frames: Frames,
    looping: bool,
    next: Option<usize>,
    interval: Option<Duration>,
    deadline: Option<Instant>,
    t_decode: Timer,
}

impl ImageSequence {
    /// Creates a sequence playing the image files at `paths`, in order.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::new(Frames::Files(paths.into_iter().map(Into::into).collect()))
    }

    /// Creates a sequence playing all JPEG and PNG files in `dir`, ordered by file name.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read directory '{}'", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| EXTENSIONS.contains(&ext));
            if supported && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        log::debug!("found {} frames in '{}'", paths.len(), dir.display());
        Ok(Self::from_paths(paths))
    }

    /// Creates a sequence playing back in-memory images.
    pub fn from_images(images: Vec<Image>) -> Self {
        Self::new(Frames::Images(images))
    }

    fn new(frames: Frames) -> Self {
        Self {
            frames,
            looping: false,
            next: None,
            interval: None,
            deadline: None,
            t_decode: Timer::new("decode"),
        }
    }

    /// Sets whether playback restarts at the first frame after the last one.
    pub fn looping(self, looping: bool) -> Self {
        Self { looping, ..self }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.len() == 0
    }

    fn pace(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        match self.deadline {
            Some(deadline) if deadline > now => {
                thread::sleep(deadline - now);
                self.deadline = Some(deadline + interval);
            }
            _ => self.deadline = Some(now + interval),
        }
    }
}

impl VideoSource for ImageSequence {
    fn open(&mut self, options: &CameraOptions) -> anyhow::Result<Resolution> {
        if self.frames.len() == 0 {
            bail!("image sequence contains no frames");
        }

        let first = self.frames.load(0, &self.t_decode)?;
        self.next = Some(0);
        self.interval = options
            .requested_fps()
            .filter(|&fps| fps != 0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps as f32));
        self.deadline = None;

        log::info!(
            "opened image sequence, {} frames @ {}",
            self.frames.len(),
            first.resolution(),
        );
        Ok(first.resolution())
    }

    fn read(&mut self) -> anyhow::Result<Option<Image>> {
        let Some(mut index) = self.next else {
            bail!("image sequence is not open");
        };
        if index == self.frames.len() {
            if !self.looping {
                return Ok(None);
            }
            index = 0;
        }

        self.pace();
        let frame = self.frames.load(index, &self.t_decode)?;
        self.next = Some(index + 1);
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.next = None;
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_decode]
    }
}

impl fmt::Debug for ImageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSequence")
            .field("frames", &self.frames.len())
            .field("looping", &self.looping)
            .field("next", &self.next)
            .finish()
    }
}
