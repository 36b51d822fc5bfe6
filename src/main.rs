//! Annotates camera frames with recorded face mesh landmarks.
//!
//! Usage:
//!   meshview --landmarks faces.jsonl --frames frames/ --output annotated/
//!   meshview --landmarks faces.jsonl --device "Integrated Camera" -n 300 --json

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use meshview::{
    annotate::{Annotator, Canvas, Layer},
    image::{Color, Image, Resolution},
    model::{ModelOptions, Replay},
    session::Session,
    video::{CameraOptions, ImageSequence, VideoSource},
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "meshview")]
#[command(author, version, about = "Draws face mesh landmarks onto camera frames", long_about = None)]
struct Args {
    /// Recorded landmark results, one JSON line per frame
    #[arg(short, long)]
    landmarks: PathBuf,

    /// Directory of JPEG/PNG frames to annotate instead of capturing from a webcam
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Name of the webcam to open (overrides `MESHVIEW_WEBCAM_NAME`)
    #[arg(long, conflicts_with = "frames")]
    device: Option<String>,

    /// Directory to write annotated frames to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Canvas and capture width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Canvas and capture height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Capture frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Drop the iris landmarks from the recording
    #[arg(long)]
    no_refine: bool,

    /// Restart frames and landmarks after the last one
    #[arg(long = "loop")]
    looping: bool,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    max_frames: Option<usize>,

    /// Override the color of a layer, e.g. `--color lips=#ff00ff`
    #[arg(long = "color", value_parser = parse_layer_color)]
    colors: Vec<(Layer, Color)>,

    /// Print a JSON summary to stdout
    #[arg(long)]
    json: bool,
}

fn parse_layer_color(s: &str) -> anyhow::Result<(Layer, Color)> {
    let Some((layer, color)) = s.split_once('=') else {
        bail!("expected `<layer>=<color>`, got '{s}'");
    };
    Ok((layer.parse()?, color.parse()?))
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    resolution: String,
    frames: usize,
    frames_with_face: usize,
    /// Landmark count of the last annotated frame.
    last_landmark_count: usize,
    error: Option<String>,
}

impl Summary {
    fn record(&mut self, landmark_count: usize) {
        self.frames += 1;
        if landmark_count != 0 {
            self.frames_with_face += 1;
        }
        self.last_landmark_count = landmark_count;
    }
}

fn main() -> anyhow::Result<()> {
    meshview::init_logger!();
    let args = Args::parse();

    let resolution = Resolution::new(args.width, args.height);
    if resolution.is_empty() {
        bail!("canvas resolution must not be empty (got {resolution})");
    }

    let mut annotator = Annotator::new();
    for &(layer, color) in &args.colors {
        let style = annotator.style(layer).color(color);
        annotator = annotator.with_style(layer, style);
    }

    let mut camera_options = CameraOptions::default().resolution(resolution);
    if let Some(fps) = args.fps {
        camera_options = camera_options.fps(fps);
    }
    if let Some(device) = &args.device {
        camera_options = camera_options.name(device.clone());
    }

    let mut session = Session::new(Canvas::new(resolution))
        .with_camera_options(camera_options)
        .with_annotator(annotator);

    let model_options = ModelOptions::default().refine_landmarks(!args.no_refine);
    let looping = args.looping;
    session.init_model(|| Ok(Replay::open(&args.landmarks, model_options)?.looping(looping)))?;

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
    }

    let (reports, reported) = crossbeam_channel::unbounded();
    let output = args.output.clone();
    let mut index = 0;
    session.on_annotated(move |image, landmark_count| {
        if let Some(dir) = &output {
            if let Err(e) = save_frame(dir, index, image) {
                log::error!("{e:#}");
            }
        }
        index += 1;
        reports.send(landmark_count).ok();
    });

    let source: Box<dyn VideoSource + Send> = match &args.frames {
        Some(dir) => Box::new(ImageSequence::from_dir(dir)?.looping(args.looping)),
        None => webcam()?,
    };
    session.start_camera(source)?;

    let mut summary = Summary {
        resolution: resolution.to_string(),
        ..Summary::default()
    };
    loop {
        if args.max_frames.map_or(false, |max| summary.frames >= max) {
            break;
        }
        match reported.recv_timeout(Duration::from_millis(100)) {
            Ok(count) => summary.record(count),
            Err(RecvTimeoutError::Timeout) => {
                if !session.is_capturing() {
                    reported.try_iter().for_each(|count| summary.record(count));
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.stop_camera();
    summary.error = session.error().map(str::to_string);
    log::info!(
        "annotated {} frames, {} with a face",
        summary.frames,
        summary.frames_with_face,
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

fn save_frame(dir: &Path, index: usize, image: &Image) -> anyhow::Result<()> {
    let path = dir.join(format!("frame{index:05}.png"));
    image
        .save(&path)
        .with_context(|| format!("failed to write '{}'", path.display()))
}

#[cfg(target_os = "linux")]
fn webcam() -> anyhow::Result<Box<dyn VideoSource + Send>> {
    Ok(Box::new(meshview::video::webcam::Webcam::new()))
}

#[cfg(not(target_os = "linux"))]
fn webcam() -> anyhow::Result<Box<dyn VideoSource + Send>> {
    bail!("webcam capture is only supported on Linux, use `--frames` instead")
}
