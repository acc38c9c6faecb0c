//! Frame-driven detection loop.
//!
//! The loop owns an inference worker thread. `tick` captures the current
//! frame and hands it to the worker without waiting; at most one inference is
//! outstanding at any time. Results are published to the overlay and the
//! record pipeline only if the loop is still armed in the same generation
//! that dispatched them, so a `stop` discards anything still in flight.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::{ClassifierAdapter, Detection};
use crate::frame::{Frame, FrameSource};
use crate::location::SharedLocation;
use crate::pipeline::RecordPipeline;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Armed,
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The loop is not armed.
    Inactive,
    /// An inference is still outstanding; this tick was skipped.
    Busy,
    /// The frame source had nothing to offer.
    NotReady,
    /// A frame was handed to the inference worker.
    Dispatched,
}

/// Receives detection snapshots for on-screen rendering.
pub trait OverlaySink: Send {
    fn render(&mut self, detections: &[Detection]);
    fn clear(&mut self);
}

pub struct NoOverlay;

impl OverlaySink for NoOverlay {
    fn render(&mut self, _detections: &[Detection]) {}
    fn clear(&mut self) {}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub busy_skips: u64,
    pub not_ready: u64,
    pub discarded_results: u64,
    pub records_created: u64,
    pub submit_failures: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    dispatched: AtomicU64,
    busy_skips: AtomicU64,
    not_ready: AtomicU64,
    discarded_results: AtomicU64,
    records_created: AtomicU64,
    submit_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LoopStats {
        LoopStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            busy_skips: self.busy_skips.load(Ordering::Relaxed),
            not_ready: self.not_ready.load(Ordering::Relaxed),
            discarded_results: self.discarded_results.load(Ordering::Relaxed),
            records_created: self.records_created.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ModelPhase {
    Loading,
    Ready,
    Failed(String),
}

struct Control {
    state: LoopState,
    generation: u64,
    in_flight: bool,
    model: ModelPhase,
}

struct Job {
    generation: u64,
    frame: Frame,
}

// Lock order: control, snapshot, overlay, source, jobs.
//
// `publish` keeps `control` held across the store appends so a `stop` can
// never interleave with a half-submitted result. A `tick` that arrives during
// those appends waits for them; with SQLite that is one indexed insert per
// accepted detection.
struct Inner {
    control: Mutex<Control>,
    model_ready: Condvar,
    snapshot: Mutex<Vec<Detection>>,
    overlay: Mutex<Box<dyn OverlaySink>>,
    source: Mutex<Box<dyn FrameSource>>,
    jobs: Mutex<Option<SyncSender<Job>>>,
    counters: Counters,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Inner {
    fn tick(&self) -> TickOutcome {
        let mut control = lock(&self.control);
        if control.state != LoopState::Armed {
            return TickOutcome::Inactive;
        }
        Counters::bump(&self.counters.ticks);
        if control.in_flight {
            Counters::bump(&self.counters.busy_skips);
            return TickOutcome::Busy;
        }

        let frame = match lock(&self.source).current_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                Counters::bump(&self.counters.not_ready);
                return TickOutcome::NotReady;
            }
            Err(e) => {
                log::warn!("frame capture failed: {:#}", e);
                Counters::bump(&self.counters.not_ready);
                return TickOutcome::NotReady;
            }
        };

        let jobs = lock(&self.jobs);
        let Some(sender) = jobs.as_ref() else {
            return TickOutcome::Inactive;
        };
        let job = Job {
            generation: control.generation,
            frame,
        };
        match sender.try_send(job) {
            Ok(()) => {
                control.in_flight = true;
                Counters::bump(&self.counters.dispatched);
                TickOutcome::Dispatched
            }
            Err(TrySendError::Full(_)) => {
                Counters::bump(&self.counters.busy_skips);
                TickOutcome::Busy
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("inference worker is gone; tick ignored");
                TickOutcome::Inactive
            }
        }
    }

    /// Drop the current snapshot and clear the overlay. Caller holds `control`.
    fn clear_outputs(&self) {
        lock(&self.snapshot).clear();
        lock(&self.overlay).clear();
    }
}

struct Ticker {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

/// Idle/Armed/Disposed detection loop around a `ClassifierAdapter`.
pub struct DetectionLoop {
    inner: Arc<Inner>,
    ticker: Mutex<Option<Ticker>>,
}

impl DetectionLoop {
    /// Spawn the inference worker and begin loading the model on it.
    ///
    /// The loop starts `Idle`; call `wait_for_model` then `start`.
    pub fn new(
        adapter: ClassifierAdapter,
        source: Box<dyn FrameSource>,
        pipeline: Arc<RecordPipeline>,
        location: SharedLocation,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(1);
        let inner = Arc::new(Inner {
            control: Mutex::new(Control {
                state: LoopState::Idle,
                generation: 0,
                in_flight: false,
                model: ModelPhase::Loading,
            }),
            model_ready: Condvar::new(),
            snapshot: Mutex::new(Vec::new()),
            overlay: Mutex::new(Box::new(NoOverlay)),
            source: Mutex::new(source),
            jobs: Mutex::new(Some(sender)),
            counters: Counters::default(),
        });

        let worker_inner = Arc::clone(&inner);
        std::thread::Builder::new()
            .name("greenlens-infer".to_string())
            .spawn(move || run_worker(worker_inner, adapter, pipeline, location, receiver))
            .map_err(|e| anyhow!("failed to spawn inference worker: {}", e))?;

        Ok(Self {
            inner,
            ticker: Mutex::new(None),
        })
    }

    pub fn with_overlay(self, overlay: Box<dyn OverlaySink>) -> Self {
        *lock(&self.inner.overlay) = overlay;
        self
    }

    pub fn state(&self) -> LoopState {
        lock(&self.inner.control).state
    }

    pub fn is_model_ready(&self) -> bool {
        lock(&self.inner.control).model == ModelPhase::Ready
    }

    /// Block until the model finished loading or `timeout` elapses.
    pub fn wait_for_model(&self, timeout: Duration) -> Result<()> {
        let control = lock(&self.inner.control);
        let (control, _) = self
            .inner
            .model_ready
            .wait_timeout_while(control, timeout, |c| c.model == ModelPhase::Loading)
            .map_err(|_| anyhow!("detection loop lock poisoned"))?;
        match &control.model {
            ModelPhase::Ready => Ok(()),
            ModelPhase::Failed(reason) => Err(anyhow!("model failed to load: {}", reason)),
            ModelPhase::Loading => Err(anyhow!(
                "model still loading after {}ms",
                timeout.as_millis()
            )),
        }
    }

    /// Idle → Armed. Fails until the model is ready, after a failed load, or
    /// once disposed. Starting an armed loop is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut control = lock(&self.inner.control);
        match control.state {
            LoopState::Armed => return Ok(()),
            LoopState::Disposed => return Err(anyhow!("detection loop is disposed")),
            LoopState::Idle => {}
        }
        match &control.model {
            ModelPhase::Ready => {}
            ModelPhase::Loading => return Err(anyhow!("model is still loading")),
            ModelPhase::Failed(reason) => {
                return Err(anyhow!("model failed to load: {}", reason))
            }
        }
        control.state = LoopState::Armed;
        log::info!("detection loop armed");
        Ok(())
    }

    /// Armed → Idle. Clears the overlay and current detections before
    /// returning; an outstanding inference will be discarded.
    pub fn stop(&self) {
        let mut control = lock(&self.inner.control);
        if control.state != LoopState::Armed {
            return;
        }
        control.state = LoopState::Idle;
        control.generation += 1;
        self.inner.clear_outputs();
        log::info!("detection loop stopped");
    }

    /// Terminal. Cancels the ticker and shuts the worker down.
    pub fn dispose(&self) {
        {
            let mut control = lock(&self.inner.control);
            if control.state == LoopState::Disposed {
                return;
            }
            control.state = LoopState::Disposed;
            control.generation += 1;
            self.inner.clear_outputs();
            lock(&self.inner.jobs).take();
        }
        if let Some(ticker) = lock(&self.ticker).take() {
            drop(ticker.cancel);
            if ticker.handle.join().is_err() {
                log::warn!("detection ticker panicked");
            }
        }
        log::info!("detection loop disposed");
    }

    pub fn tick(&self) -> TickOutcome {
        self.inner.tick()
    }

    /// Tick every `interval` on a dedicated thread until disposed.
    pub fn spawn_ticker(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }
        let mut slot = lock(&self.ticker);
        if slot.is_some() {
            return Err(anyhow!("detection ticker already running"));
        }
        if self.state() == LoopState::Disposed {
            return Err(anyhow!("detection loop is disposed"));
        }
        let (cancel, cancelled) = mpsc::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("greenlens-tick".to_string())
            .spawn(move || loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        inner.tick();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| anyhow!("failed to spawn detection ticker: {}", e))?;
        *slot = Some(Ticker { cancel, handle });
        Ok(())
    }

    /// Detections from the most recent published inference.
    pub fn current_detections(&self) -> Vec<Detection> {
        lock(&self.inner.snapshot).clone()
    }

    pub fn stats(&self) -> LoopStats {
        self.inner.counters.snapshot()
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run_worker(
    inner: Arc<Inner>,
    mut adapter: ClassifierAdapter,
    pipeline: Arc<RecordPipeline>,
    location: SharedLocation,
    jobs: Receiver<Job>,
) {
    let loaded = adapter.load_model();
    {
        let mut control = lock(&inner.control);
        control.model = match &loaded {
            Ok(()) => ModelPhase::Ready,
            Err(e) => ModelPhase::Failed(format!("{:#}", e)),
        };
        inner.model_ready.notify_all();
    }
    if loaded.is_err() {
        return;
    }

    while let Ok(job) = jobs.recv() {
        let detections = adapter.detect(&job.frame);
        publish(&inner, &pipeline, &location, job.generation, detections);
    }
    log::debug!("inference worker exiting");
}

fn publish(
    inner: &Inner,
    pipeline: &RecordPipeline,
    location: &SharedLocation,
    generation: u64,
    detections: Vec<Detection>,
) {
    let mut control = lock(&inner.control);
    control.in_flight = false;
    if control.state != LoopState::Armed || control.generation != generation {
        Counters::bump(&inner.counters.discarded_results);
        log::debug!("discarding stale inference result ({} detections)", detections.len());
        return;
    }

    lock(&inner.overlay).render(&detections);
    let here = location.get();
    for detection in &detections {
        match pipeline.submit(detection, here) {
            Ok(Some(record)) => {
                Counters::bump(&inner.counters.records_created);
                log::info!(
                    "recorded {} ({:.0}%) at {:.5},{:.5}",
                    record.category.label(),
                    record.confidence * 100.0,
                    record.lat,
                    record.lng
                );
            }
            Ok(None) => {}
            Err(e) => {
                Counters::bump(&inner.counters.submit_failures);
                log::warn!("failed to store detection {}: {:#}", detection.id, e);
            }
        }
    }
    *lock(&inner.snapshot) = detections;
}
