//! Live verification state machine.
//!
//! Idle → Starting → Running → Stopping → Idle. While Running, a
//! [`PeriodicTask`] ticks at a fixed interval; each tick captures one frame
//! and sends it for verification unless the previous request is still
//! outstanding, in which case the tick is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use presence_client::{ClientError, Registered, Registrar, Verifier};
use presence_core::{
    AttentionPolicy, AttentionStats, Canvas, DrawList, OverlayRenderer, Status, StatusKind,
    VerificationResult,
};
use presence_hw::{CameraError, CameraSession, CapturedFrame, FacingMode, MediaDevices};
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::register;
use crate::task::PeriodicTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
        })
    }
}

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("live verification is {0}, not idle")]
    NotIdle(Phase),
    #[error("live verification was stopped while starting")]
    Superseded,
    #[error("a verification request is already in flight")]
    Busy,
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Client(#[from] ClientError),
    /// A precondition the user has to fix, phrased for display.
    #[error("{0}")]
    Invalid(&'static str),
}

impl LiveError {
    /// Status line for this failure.
    pub fn status(&self) -> Status {
        match self {
            LiveError::Camera(_) => Status::new(StatusKind::Acquisition, self.to_string()),
            LiveError::Client(e) => Status::new(e.kind(), e.user_message()),
            LiveError::NotIdle(_)
            | LiveError::Superseded
            | LiveError::Busy
            | LiveError::Invalid(_) => Status::info(self.to_string()),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running; nothing to do.
    Inactive,
    /// The previous request is still outstanding.
    Skipped,
    /// A new request was sent.
    Issued,
}

#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Delay before the first tick after start.
    pub first_tick_delay: Duration,
    pub facing: FacingMode,
    /// Device id tried before any facing heuristics.
    pub preferred_device: Option<String>,
    /// Flip frames horizontally before upload, matching the preview.
    pub mirror: bool,
    /// Ask for emotion, gaze and face box on every tick. When off, ticks use
    /// the compact match-only stream endpoint and draw no overlay.
    pub analysis: bool,
    pub attention: AttentionPolicy,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            first_tick_delay: Duration::from_millis(250),
            facing: FacingMode::User,
            preferred_device: None,
            mirror: true,
            analysis: true,
            attention: AttentionPolicy::GazeOnly,
        }
    }
}

struct LiveSession {
    id: Uuid,
}

struct State<C> {
    phase: Phase,
    session: Option<LiveSession>,
    stats: AttentionStats,
    last_result: Option<VerificationResult>,
    canvas: C,
    timer: Option<PeriodicTask>,
}

struct Shared<D: MediaDevices, V, C> {
    camera: AsyncMutex<CameraSession<D>>,
    verifier: V,
    config: LiveConfig,
    renderer: OverlayRenderer,
    state: Mutex<State<C>>,
    in_flight: AtomicBool,
    requests: AtomicU64,
    skipped: AtomicU64,
    status: watch::Sender<Status>,
}

/// Drives periodic verification of the live camera feed.
pub struct LivePoller<D, V, C = DrawList>
where
    D: MediaDevices + 'static,
    V: Verifier + 'static,
    C: Canvas + Send + 'static,
{
    shared: Arc<Shared<D, V, C>>,
}

impl<D, V, C> LivePoller<D, V, C>
where
    D: MediaDevices + 'static,
    V: Verifier + 'static,
    C: Canvas + Send + 'static,
{
    pub fn new(media: D, verifier: V, canvas: C, config: LiveConfig) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self {
            shared: Arc::new(Shared {
                camera: AsyncMutex::new(CameraSession::new(media)),
                verifier,
                config,
                renderer: OverlayRenderer,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    session: None,
                    stats: AttentionStats::default(),
                    last_result: None,
                    canvas,
                    timer: None,
                }),
                in_flight: AtomicBool::new(false),
                requests: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                status,
            }),
        }
    }

    /// Begin live verification. Only valid from [`Phase::Idle`].
    ///
    /// Fails with [`LiveError::Superseded`] if [`stop`](Self::stop) runs
    /// while the camera is being acquired.
    pub async fn start(&self) -> Result<(), LiveError> {
        let shared = &self.shared;
        {
            let mut state = shared.lock_state();
            if state.phase != Phase::Idle {
                return Err(LiveError::NotIdle(state.phase));
            }
            state.phase = Phase::Starting;
        }

        if let Err(e) = shared.ensure_camera().await {
            shared.lock_state().phase = Phase::Idle;
            shared.set_status(Status::new(
                StatusKind::Acquisition,
                format!("Failed to start camera: {e}"),
            ));
            return Err(e.into());
        }

        let session_id = Uuid::new_v4();
        {
            let mut state = shared.lock_state();
            if state.phase != Phase::Starting {
                debug!(phase = %state.phase, "start superseded by stop");
                return Err(LiveError::Superseded);
            }
            state.stats.reset();
            state.last_result = None;
            state.session = Some(LiveSession { id: session_id });
            state.phase = Phase::Running;

            let weak = Arc::downgrade(shared);
            state.timer = Some(PeriodicTask::spawn(
                shared.config.first_tick_delay,
                shared.config.interval,
                move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.tick();
                    }
                },
            ));
        }

        info!(
            session = %session_id,
            interval_ms = shared.config.interval.as_millis() as u64,
            analysis = shared.config.analysis,
            "live verification started"
        );
        shared.set_status(Status::info("Live verification started"));
        Ok(())
    }

    /// End live verification and release the camera.
    ///
    /// The timer is cancelled before anything else. A request still in
    /// flight runs to completion but its result is dropped. Attention
    /// stats survive until the next [`start`](Self::start).
    pub async fn stop(&self) {
        let shared = &self.shared;
        let session = {
            let mut state = shared.lock_state();
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.phase = Phase::Stopping;
            state.last_result = None;
            shared.renderer.clear(&mut state.canvas);
            state.session.take()
        };

        shared.camera.lock().await.release();
        shared.lock_state().phase = Phase::Idle;

        if let Some(session) = session {
            let stats = self.stats();
            info!(
                session = %session.id,
                total_frames = stats.total_frames,
                attention_frames = stats.attention_frames,
                "live verification stopped"
            );
            shared.set_status(Status::info("Live verification stopped"));
        }
    }

    /// Run one tick now, exactly as the timer would.
    pub fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }

    /// Toggle user/environment camera. Ticking and stats are untouched.
    pub async fn switch_camera(&self) -> Result<FacingMode, LiveError> {
        let switched = {
            let mut camera = self.shared.camera.lock().await;
            camera.switch_facing().await.map(|s| (s.facing(), s.device_id().to_string()))
        };
        match switched {
            Ok((facing, device)) => {
                info!(%facing, %device, "switched camera");
                self.shared.set_status(Status::info(format!("Switched to {facing} camera")));
                Ok(facing)
            }
            Err(e) => {
                warn!(error = %e, "camera switch failed");
                self.shared.set_status(Status::new(
                    StatusKind::Acquisition,
                    format!("Failed to switch camera: {e}"),
                ));
                Err(e.into())
            }
        }
    }

    /// Cycle to the next enumerated device. Returns its id.
    pub async fn next_device(&self) -> Result<String, LiveError> {
        let switched = {
            let mut camera = self.shared.camera.lock().await;
            camera.next_device().await.map(|s| s.device_id().to_string())
        };
        match switched {
            Ok(device) => {
                self.shared.set_status(Status::info(format!("Using camera {device}")));
                Ok(device)
            }
            Err(e) => {
                warn!(error = %e, "device switch failed");
                self.shared.set_status(Status::new(
                    StatusKind::Acquisition,
                    format!("Failed to switch camera: {e}"),
                ));
                Err(e.into())
            }
        }
    }

    /// Acquire the camera without starting the loop. Returns the native resolution.
    pub async fn start_camera(&self) -> Result<(u32, u32), LiveError> {
        match self.shared.ensure_camera().await {
            Ok(resolution) => {
                self.shared.set_status(Status::info("Camera started"));
                Ok(resolution)
            }
            Err(e) => {
                self.shared.set_status(Status::new(
                    StatusKind::Acquisition,
                    format!("Failed to start camera: {e}"),
                ));
                Err(e.into())
            }
        }
    }

    /// Release the camera, stopping the loop first if it is running.
    pub async fn stop_camera(&self) {
        if self.phase() != Phase::Idle {
            self.stop().await;
        }
        self.shared.camera.lock().await.release();
        self.shared.set_status(Status::info("Camera stopped"));
    }

    /// Single-shot capture and verify.
    ///
    /// The overlay is drawn only for analysis results. Attention stats are
    /// not touched.
    pub async fn check_once(&self, with_analysis: bool) -> Result<VerificationResult, LiveError> {
        let shared = &self.shared;
        if shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LiveError::Busy);
        }

        let outcome = async {
            shared.ensure_camera().await?;
            let frame = shared.capture().await?;
            let result = if with_analysis {
                shared.verifier.verify_with_analysis(&frame).await?
            } else {
                shared.verifier.verify_once(&frame).await?
            };
            Ok::<_, LiveError>((frame.width, result))
        }
        .await;
        shared.in_flight.store(false, Ordering::Release);

        match outcome {
            Ok((width, result)) => {
                let status = result_status(&result);
                {
                    let mut state = shared.lock_state();
                    if with_analysis {
                        shared.renderer.render(&mut state.canvas, &result, width);
                    } else {
                        shared.renderer.clear(&mut state.canvas);
                    }
                    state.last_result = Some(result.clone());
                }
                shared.set_status(status);
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "single-shot verification failed");
                shared.set_status(e.status());
                Err(e)
            }
        }
    }

    /// Enroll `name` using a frame from the running camera.
    pub async fn register<R: Registrar + ?Sized>(
        &self,
        registrar: &R,
        name: &str,
    ) -> Result<Registered, LiveError> {
        let outcome = async {
            let name = register::registration_name(name)?;
            let frame = {
                let mut camera = self.shared.camera.lock().await;
                register::capture_for_registration(&mut *camera, self.shared.config.mirror)?
            };
            register::submit(registrar, name, &frame).await
        }
        .await;

        match &outcome {
            Ok(registered) => self.shared.set_status(register::registered_status(registered)),
            Err(e) => self.shared.set_status(e.status()),
        }
        outcome
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock_state().phase
    }

    pub fn stats(&self) -> AttentionStats {
        self.shared.lock_state().stats
    }

    pub fn last_result(&self) -> Option<VerificationResult> {
        self.shared.lock_state().last_result.clone()
    }

    pub fn status(&self) -> Status {
        self.shared.status.borrow().clone()
    }

    /// Receive every status update from now on.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.shared.status.subscribe()
    }

    /// Verification requests issued by ticks.
    pub fn requests_issued(&self) -> u64 {
        self.shared.requests.load(Ordering::Relaxed)
    }

    /// Ticks dropped because a request was still outstanding.
    pub fn ticks_skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    pub fn timer_active(&self) -> bool {
        self.shared.lock_state().timer.as_ref().is_some_and(PeriodicTask::is_active)
    }

    pub fn in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &LiveConfig {
        &self.shared.config
    }

    pub async fn is_streaming(&self) -> bool {
        self.shared.camera.lock().await.is_streaming()
    }

    /// Id of the device currently streaming, if any.
    pub async fn current_device(&self) -> Option<String> {
        let camera = self.shared.camera.lock().await;
        camera.current().map(|s| s.device_id().to_string())
    }

    /// Inspect the overlay canvas.
    pub fn with_canvas<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.shared.lock_state().canvas)
    }
}

impl<D, V, C> Drop for LivePoller<D, V, C>
where
    D: MediaDevices + 'static,
    V: Verifier + 'static,
    C: Canvas + Send + 'static,
{
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock_state();
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.session = None;
            state.phase = Phase::Idle;
        }
        // An in-flight request may still hold a reference; release now, not when it ends.
        if let Ok(mut camera) = self.shared.camera.try_lock() {
            camera.release();
        }
    }
}

impl<D, V, C> Shared<D, V, C>
where
    D: MediaDevices + 'static,
    V: Verifier + 'static,
    C: Canvas + Send + 'static,
{
    fn lock_state(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: Status) {
        debug!(kind = ?status.kind, message = %status.message, "status");
        self.status.send_replace(status);
    }

    /// Acquire the camera unless it is already streaming.
    async fn ensure_camera(&self) -> Result<(u32, u32), CameraError> {
        let mut camera = self.camera.lock().await;
        if let Some(current) = camera.current().filter(|_| camera.is_streaming()) {
            return Ok(current.resolution());
        }
        let session = camera
            .acquire(self.config.facing, self.config.preferred_device.as_deref())
            .await?;
        Ok(session.resolution())
    }

    async fn capture(&self) -> Result<CapturedFrame, CameraError> {
        self.camera.lock().await.capture(self.config.mirror)
    }

    fn tick(self: &Arc<Self>) -> TickOutcome {
        let session_id = {
            let state = self.lock_state();
            match (state.phase, &state.session) {
                (Phase::Running, Some(session)) => session.id,
                _ => return TickOutcome::Inactive,
            }
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(session = %session_id, "request still in flight, skipping tick");
            return TickOutcome::Skipped;
        }

        self.requests.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.run_request(session_id).await });
        TickOutcome::Issued
    }

    async fn run_request(self: Arc<Self>, session_id: Uuid) {
        let outcome = async {
            let frame = self.capture().await?;
            debug!(
                session = %session_id,
                width = frame.width,
                height = frame.height,
                "sending frame"
            );
            let result = if self.config.analysis {
                self.verifier.verify_with_analysis(&frame).await?
            } else {
                self.verifier.verify_stream(&frame).await?
            };
            Ok::<_, LiveError>((frame.width, result))
        }
        .await;
        self.in_flight.store(false, Ordering::Release);
        self.complete(session_id, outcome);
    }

    fn complete(&self, session_id: Uuid, outcome: Result<(u32, VerificationResult), LiveError>) {
        let mut state = self.lock_state();
        let live = state.phase == Phase::Running
            && state.session.as_ref().is_some_and(|s| s.id == session_id);
        if !live {
            debug!(session = %session_id, "discarding result of ended session");
            return;
        }

        let status = match outcome {
            Ok((width, result)) => {
                match result.gaze {
                    Some(gaze) => state.stats.record(gaze.is_looking_at_camera),
                    // Match-only answers never carry gaze; they say nothing about attention.
                    None if self.config.analysis
                        && self.config.attention == AttentionPolicy::CountMissingAsAway
                        && result.face_bbox.is_none() =>
                    {
                        state.stats.record(false)
                    }
                    None => {}
                }
                self.renderer.render(&mut state.canvas, &result, width);
                debug!(
                    session = %session_id,
                    matched = result.matched,
                    attention_pct = state.stats.percentage(),
                    "tick complete"
                );
                let status = result_status(&result);
                state.last_result = Some(result);
                status
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "tick failed");
                self.renderer.clear(&mut state.canvas);
                e.status()
            }
        };
        drop(state);
        self.set_status(status);
    }
}

fn result_status(result: &VerificationResult) -> Status {
    if result.matched {
        Status::success(result.summary())
    } else {
        Status::new(StatusKind::Service, result.summary())
    }
}
