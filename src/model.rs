//! Face landmark models.
//!
//! Landmark estimation itself happens outside of this crate: a [`Landmarker`] is a black box that
//! takes a camera frame and returns the landmarks of the faces it found. [`Replay`] plays back
//! results recorded from MediaPipe's Face Mesh solution, and [`Fixed`] returns the same result for
//! every frame.

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{bail, ensure, Context};
use serde::Deserialize;

use crate::{
    face::mesh::{FaceMesh, NUM_LANDMARKS, NUM_LANDMARKS_WITH_IRISES},
    image::Image,
    landmark::Landmarks,
    timer::Timer,
};

/// Estimates face landmarks in camera frames.
pub trait Landmarker {
    /// Computes the landmarks of every face in `frame`.
    ///
    /// Landmark positions are normalized to the frame's resolution. An empty result means that no
    /// face was found.
    fn process(&mut self, frame: &Image) -> anyhow::Result<Vec<Landmarks>>;

    /// Returns the profiling timers of this model.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<L: Landmarker + ?Sized> Landmarker for Box<L> {
    fn process(&mut self, frame: &Image) -> anyhow::Result<Vec<Landmarks>> {
        (**self).process(frame)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

/// Configuration of a face landmark model.
///
/// The defaults track a single face with iris refinement enabled, and use a confidence threshold
/// of 0.5 for both detection and tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOptions {
    max_num_faces: usize,
    refine_landmarks: bool,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            max_num_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

impl ModelOptions {
    /// Sets the maximum number of faces to return per frame.
    pub fn max_num_faces(self, max_num_faces: usize) -> Self {
        Self {
            max_num_faces,
            ..self
        }
    }

    /// Sets whether to compute the 10 additional iris landmarks.
    pub fn refine_landmarks(self, refine_landmarks: bool) -> Self {
        Self {
            refine_landmarks,
            ..self
        }
    }

    /// Sets the minimum confidence for a face detection to be considered successful.
    pub fn min_detection_confidence(self, confidence: f32) -> Self {
        Self {
            min_detection_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum confidence for a tracked face to be kept without running detection again.
    pub fn min_tracking_confidence(self, confidence: f32) -> Self {
        Self {
            min_tracking_confidence: confidence,
            ..self
        }
    }

    #[inline]
    pub fn num_faces(&self) -> usize {
        self.max_num_faces
    }

    #[inline]
    pub fn refines_landmarks(&self) -> bool {
        self.refine_landmarks
    }

    #[inline]
    pub fn detection_confidence(&self) -> f32 {
        self.min_detection_confidence
    }

    #[inline]
    pub fn tracking_confidence(&self) -> f32 {
        self.min_tracking_confidence
    }

    /// Returns the number of landmarks per face a model configured like this produces.
    pub fn num_landmarks(&self) -> usize {
        if self.refine_landmarks {
            NUM_LANDMARKS_WITH_IRISES
        } else {
            NUM_LANDMARKS
        }
    }

    /// Checks that the options are within their valid ranges.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_num_faces >= 1, "`max_num_faces` must be at least 1");
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "`{name}` must be between 0.0 and 1.0 (got {value})"
            );
        }
        Ok(())
    }

    /// Limits `faces` to the configured number of faces and landmarks.
    fn restrict(&self, faces: &mut Vec<Landmarks>) {
        faces.truncate(self.max_num_faces);
        for face in faces {
            face.truncate(self.num_landmarks());
        }
    }
}

#[derive(Deserialize)]
struct Point {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

/// One frame of recorded results, as produced by MediaPipe's `onResults` callback.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(default)]
    multi_face_landmarks: Vec<Vec<Point>>,
}

fn parse_record(line: &str) -> anyhow::Result<Vec<Landmarks>> {
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }

    let record: Record = serde_json::from_str(line)?;
    record
        .multi_face_landmarks
        .into_iter()
        .map(|points| {
            let positions = points
                .into_iter()
                .map(|Point { x, y, z }| [x, y, z])
                .collect::<Vec<_>>();
            let mesh = FaceMesh::new(Landmarks::from_positions(positions))?;
            Ok(mesh.into_landmarks())
        })
        .collect()
}

/// Plays back recorded landmark results.
///
/// Recordings are stored as JSON lines, one line per frame. Every line is an object with a
/// `multiFaceLandmarks` array holding one array of `{"x", "y", "z"}` points per face. Empty lines
/// and lines without `multiFaceLandmarks` are frames without faces.
///
/// The frame contents are ignored: every call to [`Landmarker::process`] returns the next recorded
/// frame, restricted to the configured [`ModelOptions`]. Once the recording is exhausted, no faces
/// are returned, unless looping is enabled.
pub struct Replay {
    frames: Vec<Vec<Landmarks>>,
    next: usize,
    looping: bool,
    options: ModelOptions,
    t_process: Timer,
}

impl Replay {
    /// Loads a recording from a file.
    pub fn open<P: AsRef<Path>>(path: P, options: ModelOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open recording '{}'", path.display()))?;
        Self::from_reader(BufReader::new(file), options)
            .with_context(|| format!("failed to load recording '{}'", path.display()))
    }

    /// Parses a recording from a reader yielding JSON lines.
    pub fn from_reader<R: BufRead>(reader: R, options: ModelOptions) -> anyhow::Result<Self> {
        options.validate()?;

        let mut frames = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let mut faces = parse_record(&line).with_context(|| format!("line {}", i + 1))?;
            options.restrict(&mut faces);
            frames.push(faces);
        }
        if frames.is_empty() {
            bail!("recording contains no frames");
        }

        log::debug!("loaded recording with {} frames", frames.len());
        Ok(Self {
            frames,
            next: 0,
            looping: false,
            options,
            t_process: Timer::new("replay"),
        })
    }

    /// Sets whether playback restarts at the first frame after the last one.
    pub fn looping(self, looping: bool) -> Self {
        Self { looping, ..self }
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Returns the number of recorded frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Landmarker for Replay {
    fn process(&mut self, _frame: &Image) -> anyhow::Result<Vec<Landmarks>> {
        let _guard = self.t_process.start();
        if self.next == self.frames.len() {
            if !self.looping {
                return Ok(Vec::new());
            }
            self.next = 0;
        }

        let faces = self.frames[self.next].clone();
        self.next += 1;
        Ok(faces)
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_process]
    }
}

impl fmt::Debug for Replay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replay")
            .field("frames", &self.frames.len())
            .field("next", &self.next)
            .field("looping", &self.looping)
            .field("options", &self.options)
            .finish()
    }
}

/// A [`Landmarker`] returning the same faces for every frame.
#[derive(Debug, Clone, Default)]
pub struct Fixed {
    faces: Vec<Landmarks>,
}

impl Fixed {
    pub fn new(faces: Vec<Landmarks>) -> Self {
        Self { faces }
    }

    /// Creates a [`Fixed`] model that never finds a face.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Landmarker for Fixed {
    fn process(&mut self, _frame: &Image) -> anyhow::Result<Vec<Landmarks>> {
        Ok(self.faces.clone())
    }
}
