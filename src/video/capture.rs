use std::{
    fmt,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use anyhow::Context;
use crossbeam_channel::{Receiver, SendError, Sender, TryRecvError};

use crate::{
    drop::defer,
    image::{Image, Resolution},
    timer::FpsCounter,
};

use super::{CameraOptions, VideoSource};

/// A running capture loop reading frames from a [`VideoSource`] on a background thread.
///
/// Frames are handed to the frame callback one at a time: the next frame is only read after the
/// callback has returned, so frames are never processed concurrently or out of order.
///
/// Dropping a [`Camera`] stops it like [`Camera::stop`] does.
pub struct Camera {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    resolution: Resolution,
}

impl Camera {
    /// Opens `source` and starts invoking `on_frame` for every frame it produces.
    ///
    /// The source is opened on the calling thread, so failure to acquire the device is reported
    /// here. The capture thread exits when the source runs out of frames, when reading a frame
    /// fails, or when the camera is stopped.
    pub fn start<S, F>(source: S, options: &CameraOptions, on_frame: F) -> anyhow::Result<Self>
    where
        S: VideoSource + Send + 'static,
        F: FnMut(Image) + Send + 'static,
    {
        let builder = thread::Builder::new().name("capture".into());
        Self::start_on(builder, source, options, on_frame)
    }

    fn start_on<S, F>(
        builder: thread::Builder,
        mut source: S,
        options: &CameraOptions,
        on_frame: F,
    ) -> anyhow::Result<Self>
    where
        S: VideoSource + Send + 'static,
        F: FnMut(Image) + Send + 'static,
    {
        let resolution = source.open(options)?;
        let (stop, stopped) = crossbeam_channel::bounded(0);

        // The source is only handed over once the thread exists, so it can still be closed here.
        let (handoff, handed_off) = crossbeam_channel::bounded::<S>(1);
        let spawned = builder.spawn(move || {
            if let Ok(source) = handed_off.recv() {
                capture_loop(source, stopped, on_frame);
            }
        });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                source.close();
                return Err(e).context("failed to spawn capture thread");
            }
        };
        if let Err(SendError(mut source)) = handoff.send(source) {
            source.close();
        }

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
            resolution,
        })
    }

    /// Returns the resolution reported by the video source when it was opened.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Returns whether the capture thread is still delivering frames.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stops capturing and waits for the capture thread to exit.
    ///
    /// Once this returns, the frame callback will not be called again and the video source has
    /// been closed. If the capture thread has panicked, the panic is propagated to the caller.
    pub fn stop(mut self) {
        self.shut_down();
    }

    fn shut_down(&mut self) {
        // Closing the channel tells the thread to exit after the current frame.
        drop(self.stop.take());

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => {}
                Err(payload) => {
                    if !thread::panicking() {
                        resume_unwind(payload);
                    }
                }
            }
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.shut_down();
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("resolution", &self.resolution)
            .field("running", &self.is_running())
            .finish()
    }
}

fn capture_loop<S, F>(mut source: S, stopped: Receiver<()>, mut on_frame: F)
where
    S: VideoSource,
    F: FnMut(Image),
{
    log::trace!("capture thread starting");
    let _guard = defer(|| log::trace!("capture thread exiting"));
    let mut fps = FpsCounter::new("capture");

    loop {
        match stopped.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        match source.read() {
            Ok(Some(frame)) => {
                on_frame(frame);
                fps.tick_with(|| source.timers());
            }
            Ok(None) => {
                log::debug!("end of video stream");
                break;
            }
            Err(e) => {
                log::error!("failed to read frame: {e:#}");
                break;
            }
        }
    }

    source.close();
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::bail;

    use super::*;

    /// Produces `limit` tiny frames, then ends the stream.
    struct Counting {
        limit: usize,
        produced: usize,
        closed: Arc<AtomicBool>,
    }

    impl Counting {
        fn new(limit: usize) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            let source = Self {
                limit,
                produced: 0,
                closed: closed.clone(),
            };
            (source, closed)
        }
    }

    impl VideoSource for Counting {
        fn open(&mut self, options: &CameraOptions) -> anyhow::Result<Resolution> {
            Ok(options.requested_resolution())
        }

        fn read(&mut self) -> anyhow::Result<Option<Image>> {
            if self.produced == self.limit {
                return Ok(None);
            }
            self.produced += 1;
            Ok(Some(Image::new(2, 2)))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Unavailable;

    impl VideoSource for Unavailable {
        fn open(&mut self, _: &CameraOptions) -> anyhow::Result<Resolution> {
            bail!("no supported webcam device found")
        }

        fn read(&mut self) -> anyhow::Result<Option<Image>> {
            unreachable!()
        }

        fn close(&mut self) {}
    }

    #[test]
    fn open_failure_is_returned() {
        let err = Camera::start(Unavailable, &CameraOptions::default(), |_| {}).unwrap_err();
        assert_eq!(err.to_string(), "no supported webcam device found");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn spawn_failure_closes_source() {
        let (source, closed) = Counting::new(1);
        // No address space can fit this stack.
        let builder = thread::Builder::new().stack_size(1 << 62);
        let err = Camera::start_on(builder, source, &CameraOptions::default(), |_| {}).unwrap_err();
        assert_eq!(err.to_string(), "failed to spawn capture thread");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn no_callbacks_after_stop() {
        let (source, closed) = Counting::new(usize::MAX);
        let frames = Arc::new(AtomicUsize::new(0));
        let (first_tx, first_rx) = crossbeam_channel::bounded(1);

        let camera = Camera::start(source, &CameraOptions::default(), {
            let frames = frames.clone();
            move |_| {
                frames.fetch_add(1, Ordering::SeqCst);
                first_tx.try_send(()).ok();
            }
        })
        .unwrap();
        assert_eq!(camera.resolution(), Resolution::RES_VGA);

        first_rx.recv().unwrap();
        camera.stop();
        assert!(closed.load(Ordering::SeqCst));

        let count = frames.load(Ordering::SeqCst);
        assert!(count >= 1);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(frames.load(Ordering::SeqCst), count);
    }

    #[test]
    fn frames_are_delivered_in_order() {
        struct Numbered(u8);

        impl VideoSource for Numbered {
            fn open(&mut self, _: &CameraOptions) -> anyhow::Result<Resolution> {
                Ok(Resolution::new(1, 1))
            }

            fn read(&mut self) -> anyhow::Result<Option<Image>> {
                if self.0 == 10 {
                    return Ok(None);
                }
                self.0 += 1;
                Ok(Some(Image::from_rgba8((1, 1), &[self.0, 0, 0, 255])))
            }

            fn close(&mut self) {}
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let camera = Camera::start(Numbered(0), &CameraOptions::default(), move |frame| {
            tx.send(frame.get(0, 0).r()).unwrap();
        })
        .unwrap();

        // The sender is dropped with the callback once the stream ends.
        let received = rx.iter().collect::<Vec<_>>();
        assert_eq!(received, (1..=10).collect::<Vec<_>>());
        camera.stop();
    }

    #[test]
    fn stream_end_closes_source() {
        let (source, closed) = Counting::new(3);
        let (tx, rx) = crossbeam_channel::unbounded();
        let camera = Camera::start(source, &CameraOptions::default(), move |_| {
            tx.send(()).unwrap();
        })
        .unwrap();

        assert_eq!(rx.iter().count(), 3);
        camera.stop();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn propagates_panic_on_stop() {
        let (source, _) = Counting::new(1);
        let camera = Camera::start(source, &CameraOptions::default(), |_| {
            resume_unwind(Box::new("callback panic"));
        })
        .unwrap();
        catch_unwind(AssertUnwindSafe(|| camera.stop())).unwrap_err();
    }
}
