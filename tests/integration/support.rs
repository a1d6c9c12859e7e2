//! Fake hardware and fixtures shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::RgbImage;

use shelfscan_server::{
    config::AppConfig,
    scanner::{
        device::{Camera, CandidateDecode, CaptureDevice, FrameDecoder, TagReader},
        frame::Frame,
        DeviceError, DeviceFactory, Indicator, ScanDevice, ScanSessionManager, SessionState,
        SessionTimings, SignalKind,
    },
    services::{scan_token::ScanTokenService, Services},
    AppState,
};

pub const ISBN: &str = "9786053609902";
pub const POLL: Duration = Duration::from_millis(20);
pub const GRACE: Duration = Duration::from_millis(300);
pub const PREVIEW_INTERVAL: Duration = Duration::from_millis(20);
pub const PREVIEW_IDLE_GRACE: Duration = Duration::from_millis(60);

/// Counts device ownership across every camera a [`FakeDevices`] opened
#[derive(Default)]
pub struct Probe {
    opened: AtomicUsize,
    released: AtomicUsize,
    held: AtomicUsize,
    max_held: AtomicUsize,
    spurious_stops: AtomicUsize,
}

impl Probe {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn max_held(&self) -> usize {
        self.max_held.load(Ordering::SeqCst)
    }

    pub fn spurious_stops(&self) -> usize {
        self.spurious_stops.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        let held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_held.fetch_max(held, Ordering::SeqCst);
    }

    fn release(&self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hardware misbehaviour a [`FakeDevices`] can be told to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    OpenFails,
    /// `capture_frame` errors on this frame sequence
    CaptureFailsAt(u64),
    /// `stop` blocks this long before letting go of the device
    SlowStop(Duration),
}

pub struct FakeCamera {
    probe: Arc<Probe>,
    fault: Fault,
    started: bool,
    sequence: u64,
}

fn stop_device(probe: &Probe, fault: Fault, started: &mut bool) {
    if *started {
        if let Fault::SlowStop(delay) = fault {
            std::thread::sleep(delay);
        }
        *started = false;
        probe.release();
    } else {
        probe.spurious_stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl CaptureDevice for FakeCamera {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.probe.acquire();
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        stop_device(&self.probe, self.fault, &mut self.started);
    }
}

impl Camera for FakeCamera {
    fn capture_frame(&mut self) -> Result<Frame, DeviceError> {
        if self.fault == Fault::CaptureFailsAt(self.sequence) {
            return Err(DeviceError::Transport("usb reset".into()));
        }
        let shade = (self.sequence * 40 % 255) as u8;
        let frame = Frame::new(
            RgbImage::from_pixel(32, 24, image::Rgb([shade, shade, shade])),
            self.sequence,
        );
        self.sequence += 1;
        Ok(frame)
    }
}

/// Radio reader that never sees a tag; honours the cancel predicate
pub struct FakeTagReader {
    probe: Arc<Probe>,
    started: bool,
}

impl CaptureDevice for FakeTagReader {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.probe.acquire();
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        stop_device(&self.probe, Fault::None, &mut self.started);
    }
}

impl TagReader for FakeTagReader {
    fn blocking_read(
        &mut self,
        cancel: &dyn Fn() -> bool,
        timeout: Duration,
    ) -> Result<Option<String>, DeviceError> {
        let deadline = Instant::now() + timeout;
        while !cancel() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(None)
    }
}

/// Yields `payload` from the `from_poll`-th frame of every session (1-based)
pub struct FakeDecoder {
    payload: Mutex<Option<String>>,
    from_poll: u64,
    panics: bool,
}

impl FakeDecoder {
    pub fn finding(payload: &str, from_poll: u64) -> Self {
        Self {
            payload: Mutex::new(Some(payload.to_string())),
            from_poll,
            panics: false,
        }
    }

    pub fn blind() -> Self {
        Self {
            payload: Mutex::new(None),
            from_poll: 1,
            panics: false,
        }
    }

    /// Panics on every frame, like a buggy native decoder binding
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::blind()
        }
    }
}

impl FrameDecoder for FakeDecoder {
    fn decode(&self, frame: &Frame) -> Vec<CandidateDecode> {
        if self.panics {
            panic!("decoder bug on frame {}", frame.sequence);
        }
        match self.payload.lock().unwrap().as_ref() {
            Some(text) if frame.sequence + 1 >= self.from_poll => vec![CandidateDecode {
                text: text.clone(),
                polygon: None,
            }],
            _ => Vec::new(),
        }
    }
}

pub struct FakeDevices {
    pub probe: Arc<Probe>,
    decoder: Arc<FakeDecoder>,
    fault: Fault,
    radio: bool,
}

impl FakeDevices {
    pub fn new(decoder: FakeDecoder) -> Arc<Self> {
        Self::with_fault(decoder, Fault::None)
    }

    pub fn with_fault(decoder: FakeDecoder, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            probe: Arc::new(Probe::default()),
            decoder: Arc::new(decoder),
            fault,
            radio: false,
        })
    }

    /// Opens a [`FakeTagReader`] instead of a camera
    pub fn radio() -> Arc<Self> {
        Arc::new(Self {
            probe: Arc::new(Probe::default()),
            decoder: Arc::new(FakeDecoder::blind()),
            fault: Fault::None,
            radio: true,
        })
    }
}

impl DeviceFactory for FakeDevices {
    fn open(&self) -> Result<ScanDevice, DeviceError> {
        if self.fault == Fault::OpenFails {
            return Err(DeviceError::Open("no camera attached".into()));
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        if self.radio {
            return Ok(ScanDevice::Radio(Box::new(FakeTagReader {
                probe: self.probe.clone(),
                started: false,
            })));
        }
        Ok(ScanDevice::Imaging {
            camera: Box::new(FakeCamera {
                probe: self.probe.clone(),
                fault: self.fault,
                started: false,
                sequence: 0,
            }),
            decoder: self.decoder.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Signal(SignalKind),
    Clear,
}

#[derive(Default)]
pub struct RecordingIndicator {
    events: Mutex<Vec<Event>>,
}

impl RecordingIndicator {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: SignalKind) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Signal(kind))
            .count()
    }
}

#[async_trait]
impl Indicator for RecordingIndicator {
    async fn signal(&self, kind: SignalKind) {
        self.events.lock().unwrap().push(Event::Signal(kind));
    }

    async fn clear(&self) {
        self.events.lock().unwrap().push(Event::Clear);
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scanner.poll_interval_ms = POLL.as_millis() as u64;
    config.scanner.grace_period_ms = GRACE.as_millis() as u64;
    config.scanner.preview_interval_ms = PREVIEW_INTERVAL.as_millis() as u64;
    config.scanner.preview_idle_grace_ms = PREVIEW_IDLE_GRACE.as_millis() as u64;
    config.scanner.release_timeout_ms = 200;
    config.scanner.scan_timeout_secs = 1;
    config.scanner.max_scan_timeout_secs = 5;
    config.scanner.tag_poll_interval_ms = 10;
    config.scanner.write_timeout_secs = 1;
    config.scanner.warmup_ms = 0;
    config.simulation.reveal_after_ms = 0;
    config
}

pub fn manager(
    devices: Arc<FakeDevices>,
) -> (ScanSessionManager, Arc<RecordingIndicator>) {
    let config = test_config();
    let indicator = Arc::new(RecordingIndicator::default());
    let manager = ScanSessionManager::new(
        SessionTimings::from(&config.scanner),
        devices,
        indicator.clone(),
        ScanTokenService::new(&config.auth),
    );
    (manager, indicator)
}

pub fn app_state(config: AppConfig, devices: Arc<dyn DeviceFactory>) -> AppState {
    let indicator: Arc<dyn Indicator> = Arc::new(RecordingIndicator::default());
    let services = Services::new(&config, devices, indicator);
    AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    }
}

pub async fn wait_for_state(manager: &ScanSessionManager, state: SessionState) {
    for _ in 0..400 {
        if manager.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached {:?}", state);
}
