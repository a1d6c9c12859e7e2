//! Scan session manager
//!
//! Arbitrates the single physical reader between `/scan` triggers, preview
//! viewers and the deferred teardown that follows a successful scan.
//!
//! ```text
//! Idle -> Acquiring -> Polling -> Found ----> DisplayGrace -> Releasing -> Idle
//!                          |                                    ^
//!                          +-> TimedOut | Cancelled | DeviceError -> Idle
//! ```
//!
//! Each acquisition mints a new generation. The deferred teardown scheduled
//! on `Found` carries the generation it was scheduled for and does nothing
//! once a newer session exists.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use utoipa::ToSchema;

use super::cancel::ScanContext;
use super::device::{DeviceError, DeviceFactory, ScanDevice};
use super::indicator::{Indicator, SignalKind};
use super::teardown::TeardownScheduler;
use super::worker::{self, SessionJob, WorkerReport};
use crate::config::ScannerConfig;
use crate::services::scan_token::{IssuedToken, ScanTokenService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Acquiring,
    Polling,
    DisplayGrace,
    Releasing,
}

/// Terminal result of one scan attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found { identifier: String },
    TimedOut,
    Cancelled,
    DeviceError(DeviceError),
}

/// What a trigger hands back to the HTTP layer
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// `None` when the trigger was rejected before a session existed
    pub generation: Option<u64>,
    pub outcome: ScanOutcome,
    /// Present only on `Found`
    pub token: Option<IssuedToken>,
}

impl ScanReport {
    fn rejected(error: DeviceError) -> Self {
        Self {
            generation: None,
            outcome: ScanOutcome::DeviceError(error),
            token: None,
        }
    }
}

/// What preview viewers read; replaced wholesale on every change
#[derive(Debug, Clone)]
pub struct PreviewSnapshot {
    pub generation: u64,
    pub state: SessionState,
    /// JPEG of the latest frame, frozen with overlay during display grace
    pub frame: Option<Bytes>,
}

/// Session view exposed through `/scan/status`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionStatus {
    pub state: SessionState,
    pub generation: u64,
    pub activated_at: Option<DateTime<Utc>>,
    /// Identifier found by the current session
    pub result: Option<String>,
    pub display_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SessionTimings {
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub preview_interval: Duration,
    pub preview_idle_grace: Duration,
    pub release_timeout: Duration,
    pub jpeg_quality: u8,
}

impl From<&ScannerConfig> for SessionTimings {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            grace_period: Duration::from_millis(config.grace_period_ms),
            preview_interval: Duration::from_millis(config.preview_interval_ms),
            preview_idle_grace: Duration::from_millis(config.preview_idle_grace_ms),
            release_timeout: Duration::from_millis(config.release_timeout_ms),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

struct Session {
    state: SessionState,
    generation: u64,
    activated_at: Option<DateTime<Utc>>,
    result_payload: Option<String>,
    result_display_until: Option<DateTime<Utc>>,
    /// Held only during display grace; the worker owns it while polling
    device: Option<ScanDevice>,
    cancel: Option<CancellationToken>,
}

impl Session {
    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.activated_at = None;
        self.result_payload = None;
        self.result_display_until = None;
        self.device = None;
        self.cancel = None;
    }
}

struct Shared {
    timings: SessionTimings,
    devices: Arc<dyn DeviceFactory>,
    indicator: Arc<dyn Indicator>,
    tokens: ScanTokenService,
    session: Mutex<Session>,
    preview: Arc<watch::Sender<PreviewSnapshot>>,
    teardown: TeardownScheduler,
}

#[derive(Clone)]
pub struct ScanSessionManager {
    shared: Arc<Shared>,
}

impl ScanSessionManager {
    pub fn new(
        timings: SessionTimings,
        devices: Arc<dyn DeviceFactory>,
        indicator: Arc<dyn Indicator>,
        tokens: ScanTokenService,
    ) -> Self {
        let (preview, _) = watch::channel(PreviewSnapshot {
            generation: 0,
            state: SessionState::Idle,
            frame: None,
        });

        Self {
            shared: Arc::new(Shared {
                timings,
                devices,
                indicator,
                tokens,
                session: Mutex::new(Session {
                    state: SessionState::Idle,
                    generation: 0,
                    activated_at: None,
                    result_payload: None,
                    result_display_until: None,
                    device: None,
                    cancel: None,
                }),
                preview: Arc::new(preview),
                teardown: TeardownScheduler::new(),
            }),
        }
    }

    /// Run one scan attempt to completion.
    ///
    /// `cancel` is the caller's cooperative-cancel signal (client gone). The
    /// session runs on its own task, so dropping this future cancels nothing
    /// by itself; the caller must cancel `cancel`, typically through a drop
    /// guard, and the session then releases the device and returns to idle.
    pub async fn trigger_scan(&self, timeout: Duration, cancel: CancellationToken) -> ScanReport {
        let job = match self.begin(timeout, cancel) {
            Ok(job) => job,
            Err(e) => {
                tracing::info!("Scan trigger rejected: {}", e);
                return ScanReport::rejected(e);
            }
        };
        let generation = job.generation;

        let manager = self.clone();
        let driver = tokio::spawn(async move { manager.drive(job).await });

        match driver.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(generation, "Scan session task failed: {}", e);
                self.reset_if_current(generation);
                ScanReport {
                    generation: Some(generation),
                    outcome: ScanOutcome::DeviceError(DeviceError::Worker(e.to_string())),
                    token: None,
                }
            }
        }
    }

    /// Flag the active session for cancellation; false when nothing is polling
    pub fn cancel_current_scan(&self) -> bool {
        let session = self.lock();
        match (session.state, &session.cancel) {
            (SessionState::Acquiring | SessionState::Polling, Some(token)) => {
                tracing::info!(generation = session.generation, "Cancelling current scan");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn status(&self) -> SessionStatus {
        let session = self.lock();
        SessionStatus {
            state: session.state,
            generation: session.generation,
            activated_at: session.activated_at,
            result: session.result_payload.clone(),
            display_until: session.result_display_until,
        }
    }

    /// Live JPEG frames for one viewer.
    ///
    /// Reads the latest snapshot every preview tick, so a slow viewer never
    /// holds up capture and never touches the device. During display grace
    /// the snapshot holds the frozen result frame. The stream ends once the
    /// reader has been idle for the idle grace window.
    pub fn preview_frames(&self) -> impl Stream<Item = Bytes> + Send + 'static {
        let mut snapshots = self.shared.preview.subscribe();
        let interval = self.shared.timings.preview_interval;
        let idle_grace = self.shared.timings.preview_idle_grace;

        async_stream::stream! {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let snapshot = snapshots.borrow_and_update().clone();

                if snapshot.state == SessionState::Idle {
                    let resumed = tokio::time::timeout(idle_grace, wait_for_session(&mut snapshots))
                        .await
                        .unwrap_or(false);
                    if !resumed {
                        break;
                    }
                    continue;
                }

                if let Some(frame) = snapshot.frame {
                    yield frame;
                }
            }
        }
    }

    /// Release the device of `generation` if it is still the current session.
    ///
    /// Returns false for stale generations, which are left untouched.
    pub async fn release_if_current(&self, generation: u64) -> bool {
        let device = {
            let mut session = self.lock();
            if session.generation != generation || session.state != SessionState::DisplayGrace {
                tracing::debug!(
                    generation,
                    current = session.generation,
                    "Ignoring stale teardown"
                );
                return false;
            }
            session.state = SessionState::Releasing;
            self.publish(generation, SessionState::Releasing, None);
            session.device.take()
        };

        if let Some(device) = device {
            self.release_device(device).await;
        }
        self.reset_if_current(generation);
        tracing::info!(generation, "Display grace over, device released");
        true
    }

    /// Run `work` on the blocking pool with sole use of the reader.
    ///
    /// Only starts from `Idle`; the session reports `Polling` until `work`
    /// returns, so scan triggers arriving meanwhile are rejected as busy.
    /// Completion is tracked on a spawned task, so the session returns to
    /// idle even if the caller goes away.
    pub async fn with_exclusive_device<T, F>(&self, work: F) -> Result<T, DeviceError>
    where
        F: FnOnce(&dyn DeviceFactory) -> T + Send + 'static,
        T: Send + 'static,
    {
        let generation = {
            let mut session = self.lock();
            match session.state {
                SessionState::Idle => {}
                SessionState::Releasing => return Err(DeviceError::ReleasePending),
                _ => return Err(DeviceError::Busy),
            }
            session.generation += 1;
            session.state = SessionState::Polling;
            session.activated_at = Some(Utc::now());
            self.publish(session.generation, SessionState::Polling, None);
            session.generation
        };

        let manager = self.clone();
        let devices = self.shared.devices.clone();
        let task = tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || work(devices.as_ref())).await;
            manager.reset_if_current(generation);
            result
        });

        match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) | Err(e) => Err(DeviceError::Worker(e.to_string())),
        }
    }

    /// Cancel polling, drop pending teardowns and release a held device
    pub async fn shutdown(&self) {
        self.cancel_current_scan();
        self.shared.teardown.abort_all();

        let held = {
            let mut session = self.lock();
            let held = session.device.take().map(|device| (session.generation, device));
            if held.is_some() {
                session.state = SessionState::Releasing;
            }
            held
        };
        if let Some((generation, device)) = held {
            self.release_device(device).await;
            self.reset_if_current(generation);
        }
        self.shared.indicator.clear().await;
    }

    fn begin(&self, timeout: Duration, cancel: CancellationToken) -> Result<SessionJob, DeviceError> {
        let mut session = self.lock();
        match session.state {
            SessionState::Acquiring | SessionState::Polling => return Err(DeviceError::Busy),
            SessionState::Releasing => return Err(DeviceError::ReleasePending),
            SessionState::Idle | SessionState::DisplayGrace => {}
        }

        // A trigger during display grace cuts it short; the new worker
        // releases the held device before opening its own.
        let stale_device = session.device.take();
        if stale_device.is_some() {
            tracing::info!(
                generation = session.generation,
                "New scan pre-empts display grace"
            );
        }

        session.generation += 1;
        session.state = SessionState::Acquiring;
        session.activated_at = Some(Utc::now());
        session.result_payload = None;
        session.result_display_until = None;
        session.cancel = Some(cancel.clone());
        self.publish(session.generation, SessionState::Acquiring, None);

        let generation = session.generation;
        let manager = self.clone();
        Ok(SessionJob {
            generation,
            stale_device,
            devices: self.shared.devices.clone(),
            ctx: ScanContext::new(cancel, timeout),
            timings: self.shared.timings.clone(),
            preview: self.shared.preview.clone(),
            on_polling: Some(Box::new(move || manager.mark_polling(generation))),
        })
    }

    fn mark_polling(&self, generation: u64) {
        let mut session = self.lock();
        if session.generation == generation && session.state == SessionState::Acquiring {
            session.state = SessionState::Polling;
            self.publish(generation, SessionState::Polling, None);
        }
    }

    async fn drive(self, job: SessionJob) -> ScanReport {
        let generation = job.generation;
        let span = tracing::info_span!("scan", generation);

        async move {
            tracing::info!("Scan session started");
            self.shared.indicator.signal(SignalKind::Busy).await;

            let report = tokio::task::spawn_blocking(move || worker::run(job))
                .await
                .unwrap_or_else(|e| WorkerReport::failed(DeviceError::Worker(e.to_string())));

            self.finish(generation, report).await
        }
        .instrument(span)
        .await
    }

    async fn finish(&self, generation: u64, report: WorkerReport) -> ScanReport {
        let outcome = match report.outcome {
            ScanOutcome::Found { identifier } => {
                return self
                    .complete_found(generation, identifier, report.device, report.frozen_frame)
                    .await;
            }
            outcome => outcome,
        };

        match &outcome {
            ScanOutcome::TimedOut => {
                tracing::warn!("No valid identifier before timeout");
                self.shared.indicator.signal(SignalKind::Failure).await;
            }
            ScanOutcome::DeviceError(e) => {
                tracing::error!("Scan failed: {}", e);
                self.shared.indicator.signal(SignalKind::Failure).await;
            }
            ScanOutcome::Cancelled => {
                tracing::info!("Scan cancelled by client");
                self.shared.indicator.clear().await;
            }
            ScanOutcome::Found { .. } => {}
        }

        self.reset_if_current(generation);
        ScanReport {
            generation: Some(generation),
            outcome,
            token: None,
        }
    }

    async fn complete_found(
        &self,
        generation: u64,
        identifier: String,
        device: Option<ScanDevice>,
        frozen_frame: Option<Bytes>,
    ) -> ScanReport {
        let grace = self.shared.timings.grace_period;
        let frozen_at = Instant::now();
        let display_until = Utc::now()
            + chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());

        {
            let mut session = self.lock();
            session.state = SessionState::DisplayGrace;
            session.device = device;
            session.result_payload = Some(identifier.clone());
            session.result_display_until = Some(display_until);
            session.cancel = None;
            self.publish(generation, SessionState::DisplayGrace, frozen_frame);
        }

        self.shared.indicator.signal(SignalKind::Success).await;

        let token = match self.shared.tokens.issue(&identifier) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!("Failed to mint scan token: {}", e);
                None
            }
        };

        let manager = self.clone();
        self.shared.teardown.schedule(
            generation,
            grace.saturating_sub(frozen_at.elapsed()),
            move |generation| async move {
                manager.release_if_current(generation).await;
            },
        );

        tracing::info!("Scan found {}", identifier);
        ScanReport {
            generation: Some(generation),
            outcome: ScanOutcome::Found { identifier },
            token,
        }
    }

    async fn release_device(&self, device: ScanDevice) {
        let timeout = self.shared.timings.release_timeout;
        let mut release = tokio::task::spawn_blocking(move || device.release());

        let result = match tokio::time::timeout(timeout, &mut release).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Device release exceeded {:?}, still waiting", timeout);
                release.await
            }
        };
        if let Err(e) = result {
            tracing::error!("Device release failed: {}", e);
        }
    }

    fn reset_if_current(&self, generation: u64) {
        let mut session = self.lock();
        if session.generation == generation {
            session.reset();
            self.publish(generation, SessionState::Idle, None);
        }
    }

    fn publish(&self, generation: u64, state: SessionState, frame: Option<Bytes>) {
        self.shared.preview.send_replace(PreviewSnapshot {
            generation,
            state,
            frame,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn wait_for_session(snapshots: &mut watch::Receiver<PreviewSnapshot>) -> bool {
    loop {
        if snapshots.changed().await.is_err() {
            return false;
        }
        if snapshots.borrow_and_update().state != SessionState::Idle {
            return true;
        }
    }
}
