//! Live face mesh sessions.
//!
//! A [`Session`] ties together a [`Landmarker`], a [`Camera`] and a [`Canvas`]: every captured
//! frame is passed through the model and annotated onto the canvas. The session also tracks the
//! user-visible state of the pipeline (whether the model is still loading, whether the camera is
//! active, the last error, and the number of landmarks in the last frame).

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use crate::{
    annotate::{Annotator, Canvas, Surface},
    error::Error,
    image::Image,
    model::Landmarker,
    timer::FpsCounter,
    video::{Camera, CameraOptions, VideoSource},
};

type SharedModel = Arc<Mutex<Box<dyn Landmarker + Send>>>;
type Observer = Box<dyn FnMut(&Image, usize) + Send>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A snapshot of the user-visible state of a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// `true` until the face landmark model has been initialized (or failed to).
    pub loading: bool,
    pub camera_active: bool,
    /// Message describing the last error, if any.
    pub error: Option<String>,
    /// Number of landmarks found in the most recent frame: 0, 468 or 478.
    pub landmark_count: usize,
}

/// Drives a face landmark model with frames from a camera and annotates them onto a canvas.
pub struct Session {
    model: Option<SharedModel>,
    loading: bool,
    canvas: Arc<Mutex<Canvas>>,
    annotator: Arc<Annotator>,
    camera: Option<Camera>,
    options: CameraOptions,
    error: Option<String>,
    landmark_count: Arc<AtomicUsize>,
    observer: Option<Arc<Mutex<Observer>>>,
}

impl Session {
    /// Creates a session drawing onto `canvas`.
    ///
    /// The session starts out *loading*: [`Session::init_model`] has to be called before the
    /// camera can be started.
    pub fn new(canvas: Canvas) -> Self {
        Self {
            model: None,
            loading: true,
            canvas: Arc::new(Mutex::new(canvas)),
            annotator: Arc::new(Annotator::new()),
            camera: None,
            options: CameraOptions::default(),
            error: None,
            landmark_count: Arc::new(AtomicUsize::new(0)),
            observer: None,
        }
    }

    /// Sets the options used to open video sources.
    pub fn with_camera_options(mut self, options: CameraOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the annotator used to draw frames.
    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Arc::new(annotator);
        self
    }

    /// Registers a callback invoked after every annotated frame with the canvas contents and the
    /// landmark count.
    ///
    /// The callback runs on the capture thread. It is not invoked while the canvas is detached.
    pub fn on_annotated<F>(&mut self, observer: F)
    where
        F: FnMut(&Image, usize) + Send + 'static,
    {
        self.observer = Some(Arc::new(Mutex::new(Box::new(observer))));
    }

    /// Initializes the face landmark model by invoking `init`.
    ///
    /// If initialization fails, the error is recorded and returned, and the session stays without
    /// a model until this is called again.
    pub fn init_model<M, F>(&mut self, init: F) -> Result<(), Error>
    where
        M: Landmarker + Send + 'static,
        F: FnOnce() -> anyhow::Result<M>,
    {
        self.loading = true;
        let result = init();
        self.loading = false;

        match result {
            Ok(model) => {
                log::debug!("face mesh initialized");
                self.model = Some(Arc::new(Mutex::new(Box::new(model))));
                Ok(())
            }
            Err(e) => Err(self.record(Error::ModelInit(e))),
        }
    }

    /// Opens `source` and starts annotating its frames.
    ///
    /// A camera that is already running is stopped first. On failure, the error is recorded and
    /// returned, and the camera stays inactive.
    pub fn start_camera<S>(&mut self, source: S) -> Result<(), Error>
    where
        S: VideoSource + Send + 'static,
    {
        let Some(model) = self.model.clone() else {
            return Err(self.record(Error::NotInitialized));
        };
        self.error = None;
        self.stop_camera();

        let canvas = self.canvas.clone();
        let annotator = self.annotator.clone();
        let landmark_count = self.landmark_count.clone();
        let observer = self.observer.clone();
        let mut fps = FpsCounter::new("session");

        let on_frame = move |frame: Image| {
            let mut model = lock(&model);
            let faces = match model.process(&frame) {
                Ok(faces) => faces,
                Err(e) => {
                    log::error!("{}", Error::Model(e));
                    Vec::new()
                }
            };

            let mut canvas = lock(&canvas);
            let count = annotator.annotate(&mut *canvas, &frame, &faces);
            landmark_count.store(count, Ordering::SeqCst);

            if let (Some(observer), Some(image)) = (&observer, canvas.image()) {
                let mut observer = lock(observer);
                (*observer)(image, count);
            }
            drop(canvas);

            fps.tick_with(|| model.timers().into_iter().chain([annotator.timer()]));
        };

        match Camera::start(source, &self.options, on_frame) {
            Ok(camera) => {
                log::debug!("camera started at {}", camera.resolution());
                self.camera = Some(camera);
                Ok(())
            }
            Err(e) => Err(self.record(Error::Camera(e))),
        }
    }

    /// Stops the camera, resets the landmark count, and clears the canvas.
    ///
    /// When this returns, no further frame will be drawn. Calling this without an active camera
    /// still clears the canvas.
    pub fn stop_camera(&mut self) {
        if let Some(camera) = self.camera.take() {
            camera.stop();
            log::debug!("camera stopped");
        }
        self.landmark_count.store(0, Ordering::SeqCst);
        lock(&self.canvas).clear();
    }

    #[inline]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Returns whether a camera was started and has not been stopped since.
    ///
    /// This stays `true` when the video source runs out of frames.
    #[inline]
    pub fn is_camera_active(&self) -> bool {
        self.camera.is_some()
    }

    /// Returns whether the camera is still delivering frames.
    pub fn is_capturing(&self) -> bool {
        self.camera.as_ref().map_or(false, Camera::is_running)
    }

    /// Returns the message of the most recent error.
    ///
    /// The error is cleared when the camera is started successfully.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the number of landmarks found in the most recently annotated frame.
    pub fn landmark_count(&self) -> usize {
        self.landmark_count.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            loading: self.is_loading(),
            camera_active: self.is_camera_active(),
            error: self.error.clone(),
            landmark_count: self.landmark_count(),
        }
    }

    /// Returns a copy of the current canvas contents, or [`None`] if the canvas is detached.
    pub fn snapshot(&self) -> Option<Image> {
        lock(&self.canvas).image().cloned()
    }

    /// Runs `f` with exclusive access to the canvas.
    ///
    /// This blocks the capture thread while `f` runs.
    pub fn with_canvas<R>(&self, f: impl FnOnce(&mut Canvas) -> R) -> R {
        f(&mut lock(&self.canvas))
    }

    fn record(&mut self, error: Error) -> Error {
        log::error!("{error}");
        self.error = Some(error.to_string());
        error
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_camera();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("camera", &self.camera)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use crate::{
        image::{Color, Resolution},
        landmark::Landmarks,
        model::Fixed,
        video::ImageSequence,
    };

    use super::*;

    fn frames(n: usize) -> ImageSequence {
        ImageSequence::from_images(vec![Image::filled((8, 6), Color::BLUE); n])
    }

    #[test]
    fn starts_loading() {
        let session = Session::new(Canvas::detached());
        assert_eq!(
            session.state(),
            SessionState {
                loading: true,
                camera_active: false,
                error: None,
                landmark_count: 0,
            }
        );
    }

    #[test]
    fn model_init_failure() {
        let mut session = Session::new(Canvas::new((8, 6)));
        let err = session
            .init_model(|| -> anyhow::Result<Fixed> { Err(anyhow!("no model data")) })
            .unwrap_err();
        assert!(matches!(err, Error::ModelInit(_)));
        assert!(!session.is_loading());
        assert_eq!(
            session.error(),
            Some("failed to initialize face mesh: no model data")
        );

        let err = session.start_camera(frames(1)).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
        assert_eq!(session.error(), Some("face mesh is not initialized"));
        assert!(!session.is_camera_active());
    }

    #[test]
    fn camera_failure() {
        let mut session = Session::new(Canvas::new((8, 6)));
        session.init_model(|| Ok(Fixed::empty())).unwrap();

        let err = session.start_camera(frames(0)).unwrap_err();
        assert!(matches!(err, Error::Camera(_)));
        assert!(session
            .error()
            .unwrap()
            .starts_with("failed to access camera: "));
        assert!(!session.is_camera_active());
    }

    #[test]
    fn annotates_and_clears_on_stop() {
        let mut session = Session::new(Canvas::new(Resolution::new(8, 6)));
        session
            .init_model(|| Ok(Fixed::new(vec![Landmarks::new(478)])))
            .unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        session.on_annotated(move |image, count| {
            tx.send((image.get(7, 5), count)).unwrap();
        });
        session.start_camera(frames(3)).unwrap();
        assert!(session.is_camera_active());
        assert_eq!(session.error(), None);

        let seen = rx.iter().take(3).collect::<Vec<_>>();
        assert_eq!(seen, [(Color::BLUE, 478); 3]);
        assert_eq!(session.landmark_count(), 478);
        assert_eq!(session.snapshot().unwrap().get(7, 5), Color::BLUE);

        session.stop_camera();
        assert!(!session.is_camera_active());
        assert_eq!(session.landmark_count(), 0);
        let snapshot = session.snapshot().unwrap();
        assert!(snapshot.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn model_errors_draw_frame_without_landmarks() {
        struct Broken;

        impl Landmarker for Broken {
            fn process(&mut self, _: &Image) -> anyhow::Result<Vec<Landmarks>> {
                Err(anyhow!("inference failed"))
            }
        }

        let mut session = Session::new(Canvas::new((8, 6)));
        session.init_model(|| Ok(Broken)).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        session.on_annotated(move |image, count| {
            tx.send((image.get(0, 0), count)).unwrap();
        });
        session.start_camera(frames(1)).unwrap();

        assert_eq!(rx.recv().unwrap(), (Color::BLUE, 0));
        assert_eq!(session.error(), None);
    }

    #[test]
    fn detached_canvas_is_not_annotated() {
        let mut session = Session::new(Canvas::detached());
        session
            .init_model(|| Ok(Fixed::new(vec![Landmarks::new(468)])))
            .unwrap();
        session.start_camera(frames(2)).unwrap();
        session.stop_camera();
        assert_eq!(session.landmark_count(), 0);
        assert_eq!(session.snapshot(), None);

        session.with_canvas(|canvas| canvas.attach((8, 6)));
        assert!(session.snapshot().is_some());
    }
}
