//! Blocking side of a scan session

use std::sync::Arc;

use axum::body::Bytes;
use tokio::sync::watch;

use super::cancel::{ScanContext, StopReason};
use super::device::{Camera, DeviceError, DeviceFactory, FrameDecoder, ScanDevice, TagReader};
use super::frame::{Frame, Polygon};
use super::isbn::{is_valid_isbn, normalize_isbn};
use super::session::{PreviewSnapshot, ScanOutcome, SessionState, SessionTimings};

/// Everything the worker thread owns for one generation
pub(crate) struct SessionJob {
    pub generation: u64,
    /// Device left over from a pre-empted display grace
    pub stale_device: Option<ScanDevice>,
    pub devices: Arc<dyn DeviceFactory>,
    pub ctx: ScanContext,
    pub timings: SessionTimings,
    pub preview: Arc<watch::Sender<PreviewSnapshot>>,
    /// Called once the device is started and polling begins
    pub on_polling: Option<Box<dyn FnOnce() + Send>>,
}

pub(crate) struct WorkerReport {
    pub outcome: ScanOutcome,
    /// Handed back still started, only on `Found`
    pub device: Option<ScanDevice>,
    pub frozen_frame: Option<Bytes>,
}

impl WorkerReport {
    pub fn failed(error: DeviceError) -> Self {
        Self {
            outcome: ScanOutcome::DeviceError(error),
            device: None,
            frozen_frame: None,
        }
    }

    fn stopped(reason: StopReason) -> Self {
        let outcome = match reason {
            StopReason::Cancelled => ScanOutcome::Cancelled,
            StopReason::TimedOut => ScanOutcome::TimedOut,
        };
        Self {
            outcome,
            device: None,
            frozen_frame: None,
        }
    }
}

enum PollResult {
    Found {
        identifier: String,
        frozen_frame: Option<Bytes>,
    },
    Stopped(StopReason),
}

/// Owns the opened device and stops it when dropped.
///
/// Covers unwinding out of an adapter call as well as the ordinary failure
/// paths; only `into_found` hands the still-started device on.
struct DeviceGuard(Option<ScanDevice>);

impl DeviceGuard {
    fn device(&mut self) -> Result<&mut ScanDevice, DeviceError> {
        self.0
            .as_mut()
            .ok_or_else(|| DeviceError::Worker("device already released".into()))
    }

    fn into_found(mut self) -> Option<ScanDevice> {
        self.0.take()
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        if let Some(device) = self.0.take() {
            if std::thread::panicking() {
                tracing::error!("Scan worker panicked, releasing {} device", device.kind());
            }
            device.release();
        }
    }
}

/// Acquire, poll and, unless a result was found, release the device.
///
/// Every path that does not return `Found` has stopped the device before
/// returning, including a panic inside an adapter.
pub(crate) fn run(mut job: SessionJob) -> WorkerReport {
    let _span = tracing::info_span!("scan_worker", generation = job.generation).entered();

    if let Some(stale) = job.stale_device.take() {
        tracing::debug!("Releasing device held by the previous session");
        stale.release();
    }
    if let Some(reason) = job.ctx.stop_reason() {
        return WorkerReport::stopped(reason);
    }

    let mut guard = match job.devices.open() {
        Ok(device) => DeviceGuard(Some(device)),
        Err(e) => return WorkerReport::failed(e),
    };

    match poll(&mut guard, &mut job) {
        Ok(PollResult::Found {
            identifier,
            frozen_frame,
        }) => WorkerReport {
            outcome: ScanOutcome::Found { identifier },
            device: guard.into_found(),
            frozen_frame,
        },
        Ok(PollResult::Stopped(reason)) => {
            drop(guard);
            WorkerReport::stopped(reason)
        }
        Err(e) => {
            drop(guard);
            WorkerReport::failed(e)
        }
    }
}

fn poll(guard: &mut DeviceGuard, job: &mut SessionJob) -> Result<PollResult, DeviceError> {
    let device = guard.device()?;
    device.start()?;

    tracing::debug!("{} device ready, polling", device.kind());
    if let Some(on_polling) = job.on_polling.take() {
        on_polling();
    }

    match device {
        ScanDevice::Imaging { camera, decoder } => {
            poll_imaging(camera.as_mut(), decoder.as_ref(), job)
        }
        ScanDevice::Radio(reader) => poll_radio(reader.as_mut(), job),
    }
}

fn poll_imaging(
    camera: &mut dyn Camera,
    decoder: &dyn FrameDecoder,
    job: &SessionJob,
) -> Result<PollResult, DeviceError> {
    let ctx = &job.ctx;

    loop {
        if let Some(reason) = ctx.stop_reason() {
            return Ok(PollResult::Stopped(reason));
        }

        let frame = camera.capture_frame()?;
        let candidates = decoder.decode(&frame);
        let polygons: Vec<Polygon> = candidates
            .iter()
            .filter_map(|candidate| candidate.polygon.clone())
            .collect();

        if let Some(found) = candidates.iter().find(|c| is_valid_isbn(&c.text)) {
            let identifier = normalize_isbn(&found.text);
            tracing::info!(frame = frame.sequence, "Decoded identifier {}", identifier);
            let frozen_frame = encode(&frame.with_overlay(&polygons, Some(&identifier)), job);
            return Ok(PollResult::Found {
                identifier,
                frozen_frame,
            });
        }

        for candidate in &candidates {
            tracing::debug!("Ignoring decoded payload {:?}: not an ISBN", candidate.text);
        }
        let live = encode(&frame.with_overlay(&polygons, None), job);
        publish(job, SessionState::Polling, live);

        ctx.pause(job.timings.poll_interval);
    }
}

fn poll_radio(reader: &mut dyn TagReader, job: &SessionJob) -> Result<PollResult, DeviceError> {
    let ctx = &job.ctx;
    let cancelled = || ctx.is_cancelled();

    loop {
        if let Some(reason) = ctx.stop_reason() {
            return Ok(PollResult::Stopped(reason));
        }

        match reader.blocking_read(&cancelled, ctx.remaining())? {
            Some(text) if is_valid_isbn(&text) => {
                let identifier = normalize_isbn(&text);
                tracing::info!("Read identifier {} from tag", identifier);
                return Ok(PollResult::Found {
                    identifier,
                    frozen_frame: None,
                });
            }
            Some(text) => {
                tracing::debug!("Ignoring tag text {:?}: not an ISBN", text);
                ctx.pause(job.timings.poll_interval);
            }
            None => {}
        }
    }
}

fn encode(frame: &Frame, job: &SessionJob) -> Option<Bytes> {
    frame
        .encode_jpeg(job.timings.jpeg_quality)
        .map_err(|e| tracing::warn!("Failed to encode preview frame: {}", e))
        .ok()
}

fn publish(job: &SessionJob, state: SessionState, frame: Option<Bytes>) {
    job.preview.send_replace(PreviewSnapshot {
        generation: job.generation,
        state,
        frame,
    });
}
