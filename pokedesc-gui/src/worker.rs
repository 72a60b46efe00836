//! Background caption worker. The model lives on a dedicated thread so the
//! UI thread never blocks on loading or generation.

use pokedesc::{Caption, CaptionClient, DescriberError, DescriberResult, ModelLoader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Processing,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Processing => "processing",
        }
    }
}

#[derive(Debug)]
pub enum WorkerEvent {
    /// Eager load finished.
    ModelReady,
    /// Eager load failed; the next job retries.
    ModelFailed(DescriberError),
    Caption(DescriberResult<Caption>),
}

#[derive(Debug)]
pub enum WorkerPoll {
    Event(WorkerEvent),
    Empty(WorkerState),
    Disconnected,
}

pub struct CaptionWorker {
    /// Queued or running units of work: the preload plus submitted jobs.
    in_flight: Arc<AtomicUsize>,
    job_tx: Option<mpsc::Sender<PathBuf>>,
    event_rx: mpsc::Receiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
}

impl CaptionWorker {
    /// Spawns the worker thread. The loader is moved onto the thread and the
    /// model is built there, so it never crosses threads.
    pub fn spawn<L>(loader: L, preload: bool) -> DescriberResult<Self>
    where
        L: ModelLoader + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel::<PathBuf>();
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>();
        let in_flight = Arc::new(AtomicUsize::new(usize::from(preload)));

        let handle = std::thread::Builder::new()
            .name("caption-engine".into())
            .spawn({
                let in_flight = in_flight.clone();
                move || {
                    let mut client = CaptionClient::new(loader);
                    info!("Caption worker started for {}", client.loader().describe());

                    if preload {
                        let event = match client.preload() {
                            Ok(()) => WorkerEvent::ModelReady,
                            Err(e) => {
                                error!("Model preload failed: {e}");
                                WorkerEvent::ModelFailed(e)
                            }
                        };
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        let _ = event_tx.send(event);
                    }

                    while let Ok(path) = job_rx.recv() {
                        debug!("Captioning {}", path.display());
                        let result = client.describe(&path);
                        if let Err(ref e) = result {
                            error!("Caption failed: {e}");
                        }
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        if event_tx.send(WorkerEvent::Caption(result)).is_err() {
                            break;
                        }
                    }
                    info!("Caption worker stopped");
                }
            })
            .map_err(|e| {
                error!("Failed to spawn caption worker: {e}");
                DescriberError::WorkerUnavailable
            })?;

        Ok(Self {
            in_flight,
            job_tx: Some(job_tx),
            event_rx,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> WorkerState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            WorkerState::Processing
        } else {
            WorkerState::Idle
        }
    }

    pub fn submit(&self, path: PathBuf) -> DescriberResult<()> {
        let tx = self.job_tx.as_ref().ok_or(DescriberError::WorkerUnavailable)?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tx.send(path).map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            DescriberError::WorkerUnavailable
        })
    }

    pub fn try_poll(&self) -> WorkerPoll {
        match self.event_rx.try_recv() {
            Ok(event) => WorkerPoll::Event(event),
            Err(mpsc::TryRecvError::Empty) => WorkerPoll::Empty(self.state()),
            Err(mpsc::TryRecvError::Disconnected) => WorkerPoll::Disconnected,
        }
    }

    /// Closes the job channel. With `wait`, blocks until the thread has
    /// drained; otherwise the thread is detached.
    pub fn stop(&mut self, wait: bool) {
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            if wait {
                let _ = handle.join();
            } else {
                debug!("Caption worker detached");
            }
        }
    }
}

/// Dropping never joins. A model download or caption still running is
/// abandoned when the process exits, so closing the window never waits on it.
impl Drop for CaptionWorker {
    fn drop(&mut self) {
        self.stop(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use pokedesc_core::models::{CaptionOutput, ImageCaptioner};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct FixedCaptioner;

    impl ImageCaptioner for FixedCaptioner {
        fn caption(&mut self, _image: &RgbImage) -> anyhow::Result<CaptionOutput> {
            Ok(CaptionOutput {
                text: "a small fire lizard".into(),
                tokens_generated: 4,
                duration_secs: 0.0,
            })
        }
    }

    #[derive(Clone, Default)]
    struct FakeLoader {
        loads: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ModelLoader for FakeLoader {
        type Model = FixedCaptioner;

        fn load(&self) -> DescriberResult<FixedCaptioner> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DescriberError::ModelLoad("weights missing".into()))
            } else {
                Ok(FixedCaptioner)
            }
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn wait_event(worker: &CaptionWorker) -> WorkerEvent {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            match worker.try_poll() {
                WorkerPoll::Event(event) => return event,
                WorkerPoll::Empty(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                other => panic!("no worker event: {other:?}"),
            }
        }
    }

    fn write_png(dir: &Path) -> PathBuf {
        let path = dir.join("charmander.png");
        RgbImage::from_pixel(4, 4, image::Rgb([240, 120, 40]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn captions_submitted_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path());
        let loader = FakeLoader::default();
        let worker = CaptionWorker::spawn(loader.clone(), false).unwrap();
        assert_eq!(worker.state(), WorkerState::Idle);

        worker.submit(path.clone()).unwrap();
        match wait_event(&worker) {
            WorkerEvent::Caption(Ok(c)) => assert_eq!(c.text, "a small fire lizard"),
            other => panic!("unexpected event: {other:?}"),
        }

        worker.submit(path).unwrap();
        assert!(matches!(wait_event(&worker), WorkerEvent::Caption(Ok(_))));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[test]
    fn missing_file_reports_not_found_without_loading() {
        let loader = FakeLoader::default();
        let worker = CaptionWorker::spawn(loader.clone(), false).unwrap();

        worker.submit(PathBuf::from("missing.png")).unwrap();
        match wait_event(&worker) {
            WorkerEvent::Caption(Err(e)) => assert!(e.is_not_found()),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn preload_reports_readiness() {
        let loader = FakeLoader::default();
        let worker = CaptionWorker::spawn(loader.clone(), true).unwrap();
        assert!(matches!(wait_event(&worker), WorkerEvent::ModelReady));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn preload_failure_is_reported() {
        let loader = FakeLoader {
            fail: true,
            ..Default::default()
        };
        let worker = CaptionWorker::spawn(loader, true).unwrap();
        match wait_event(&worker) {
            WorkerEvent::ModelFailed(DescriberError::ModelLoad(msg)) => {
                assert_eq!(msg, "weights missing")
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn stopped_worker_rejects_jobs() {
        let mut worker = CaptionWorker::spawn(FakeLoader::default(), false).unwrap();
        worker.stop(true);
        assert!(matches!(
            worker.submit(PathBuf::from("x.png")),
            Err(DescriberError::WorkerUnavailable)
        ));
        assert!(matches!(worker.try_poll(), WorkerPoll::Disconnected));
    }

    /// Blocks in both `load` and `caption` until the test releases it.
    #[derive(Clone)]
    struct GatedLoader {
        gate: Arc<std::sync::Mutex<mpsc::Receiver<()>>>,
    }

    struct GatedCaptioner {
        gate: Arc<std::sync::Mutex<mpsc::Receiver<()>>>,
    }

    impl GatedLoader {
        fn new() -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let loader = Self {
                gate: Arc::new(std::sync::Mutex::new(rx)),
            };
            (loader, tx)
        }
    }

    impl ImageCaptioner for GatedCaptioner {
        fn caption(&mut self, image: &RgbImage) -> anyhow::Result<CaptionOutput> {
            let _ = self.gate.lock().unwrap().recv();
            FixedCaptioner.caption(image)
        }
    }

    impl ModelLoader for GatedLoader {
        type Model = GatedCaptioner;

        fn load(&self) -> DescriberResult<GatedCaptioner> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(GatedCaptioner {
                gate: self.gate.clone(),
            })
        }

        fn describe(&self) -> String {
            "gated".into()
        }
    }

    #[test]
    fn job_queued_during_preload_keeps_worker_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path());
        let (loader, release) = GatedLoader::new();
        let worker = CaptionWorker::spawn(loader, true).unwrap();
        assert_eq!(worker.state(), WorkerState::Processing);

        worker.submit(path).unwrap();
        release.send(()).unwrap();
        assert!(matches!(wait_event(&worker), WorkerEvent::ModelReady));
        // The queued job is now blocked inside the captioner.
        assert_eq!(worker.state(), WorkerState::Processing);

        release.send(()).unwrap();
        assert!(matches!(wait_event(&worker), WorkerEvent::Caption(Ok(_))));
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[test]
    fn dropping_does_not_wait_for_a_running_load() {
        let (loader, release) = GatedLoader::new();
        let worker = CaptionWorker::spawn(loader, true).unwrap();

        let start = Instant::now();
        drop(worker);
        assert!(start.elapsed() < Duration::from_secs(5));
        drop(release);
    }

    #[test]
    fn disconnected_poll_repeats_without_panicking() {
        let mut worker = CaptionWorker::spawn(FakeLoader::default(), false).unwrap();
        worker.stop(true);
        for _ in 0..3 {
            assert!(matches!(worker.try_poll(), WorkerPoll::Disconnected));
        }
    }

    #[test]
    fn state_names() {
        assert_eq!(WorkerState::Idle.as_str(), "idle");
        assert_eq!(WorkerState::Processing.as_str(), "processing");
    }
}
