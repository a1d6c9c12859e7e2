//! Simulated reader hardware for development hosts
//!
//! Mirrors the behaviour of the desk's mock routers: each scan succeeds with
//! `success_rate` probability once `reveal_after` has elapsed, and the
//! identifier served is whatever was last provisioned through `/scan/write`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use rand::Rng;

use super::device::{
    CandidateDecode, DeviceError, DeviceFactory, FrameDecoder, ScanDevice, TagWriter,
};
use super::frame::{Frame, Point};
use super::imaging::{ExposureControls, FrameSource, ImagingCamera, ImagingSettings};
use super::ndef;
use super::radio::RadioReader;
use crate::config::{ScannerConfig, ScannerMode, SimulationConfig};

/// Identifier currently "printed" on the simulated item
pub type SharedIdentifier = Arc<Mutex<String>>;

fn read_identifier(identifier: &SharedIdentifier) -> String {
    identifier
        .lock()
        .map(|value| value.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

/// Synthetic sensor producing a drifting stripe pattern
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    width: u32,
    height: u32,
    streaming: bool,
    tick: u32,
}

impl FrameSource for SimulatedSensor {
    fn configure(&mut self, width: u32, height: u32) -> Result<(), DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::Open(format!("unsupported resolution {width}x{height}")));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), DeviceError> {
        self.streaming = true;
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.streaming = false;
    }

    fn auto_controls(&mut self) -> Result<ExposureControls, DeviceError> {
        Ok(ExposureControls {
            exposure_time_us: 10_000,
            analogue_gain: 1.0,
            colour_gains: (1.8, 1.5),
        })
    }

    fn pin_controls(&mut self, _controls: ExposureControls) -> Result<(), DeviceError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RgbImage, DeviceError> {
        if !self.streaming {
            return Err(DeviceError::Transport("sensor stream stopped".to_string()));
        }
        self.tick = self.tick.wrapping_add(3);
        let tick = self.tick;
        Ok(RgbImage::from_fn(self.width, self.height, |x, _| {
            let level = if ((x + tick) / 8) % 2 == 0 { 40 } else { 200 };
            Rgb([level, level, level])
        }))
    }
}

/// Decoder that "finds" the shared identifier on lucky sessions
pub struct SimulatedDecoder {
    identifier: SharedIdentifier,
    success_rate: f64,
    reveal_after_frames: u64,
    lucky: AtomicBool,
}

impl SimulatedDecoder {
    pub fn new(identifier: SharedIdentifier, success_rate: f64, reveal_after_frames: u64) -> Self {
        Self {
            identifier,
            success_rate,
            reveal_after_frames,
            lucky: AtomicBool::new(false),
        }
    }
}

impl FrameDecoder for SimulatedDecoder {
    fn decode(&self, frame: &Frame) -> Vec<CandidateDecode> {
        // Sequence restarts with every device start, so roll once per session
        if frame.sequence == 0 {
            let lucky = rand::thread_rng().gen_bool(self.success_rate);
            self.lucky.store(lucky, Ordering::Relaxed);
        }
        if !self.lucky.load(Ordering::Relaxed) || frame.sequence < self.reveal_after_frames {
            return Vec::new();
        }

        let (w, h) = (frame.width(), frame.height());
        vec![CandidateDecode {
            text: read_identifier(&self.identifier),
            polygon: Some(vec![
                Point::new(w / 4, h * 2 / 5),
                Point::new(w * 3 / 4, h * 2 / 5),
                Point::new(w * 3 / 4, h * 3 / 5),
                Point::new(w / 4, h * 3 / 5),
            ]),
        }]
    }
}

/// Transceiver that presents a tag after `reveal_after` on lucky sessions
pub struct SimulatedTransceiver {
    identifier: SharedIdentifier,
    success_rate: f64,
    reveal_after: Duration,
    opened_at: Option<Instant>,
    lucky: bool,
}

impl SimulatedTransceiver {
    pub fn new(identifier: SharedIdentifier, success_rate: f64, reveal_after: Duration) -> Self {
        Self {
            identifier,
            success_rate,
            reveal_after,
            opened_at: None,
            lucky: false,
        }
    }
}

impl super::radio::Transceiver for SimulatedTransceiver {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.opened_at = Some(Instant::now());
        self.lucky = rand::thread_rng().gen_bool(self.success_rate);
        Ok(())
    }

    fn close(&mut self) {
        self.opened_at = None;
    }

    fn sense(&mut self, window: Duration) -> Result<Option<Vec<u8>>, DeviceError> {
        let opened_at = self
            .opened_at
            .ok_or_else(|| DeviceError::Transport("transceiver is closed".to_string()))?;
        thread::sleep(window);

        if !self.lucky || opened_at.elapsed() < self.reveal_after {
            return Ok(None);
        }
        ndef::encode_text_message(&read_identifier(&self.identifier))
            .map(Some)
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }

    fn write_ndef(&mut self, message: &[u8], window: Duration) -> Result<bool, DeviceError> {
        if !self.lucky {
            thread::sleep(window);
            return Ok(false);
        }
        thread::sleep(window.min(self.reveal_after));

        let text = ndef::first_text(message)
            .map_err(|e| DeviceError::Transport(e.to_string()))?
            .ok_or_else(|| DeviceError::Transport("message has no text record".to_string()))?;
        match self.identifier.lock() {
            Ok(mut stored) => *stored = text,
            Err(poisoned) => *poisoned.into_inner() = text,
        }
        Ok(true)
    }
}

/// [`DeviceFactory`] wiring the simulated parts together
pub struct SimulatedDevices {
    mode: ScannerMode,
    imaging: ImagingSettings,
    tag_poll_interval: Duration,
    simulation: SimulationConfig,
    identifier: SharedIdentifier,
    decoder: Arc<SimulatedDecoder>,
}

impl SimulatedDevices {
    pub fn new(scanner: &ScannerConfig, simulation: &SimulationConfig) -> Self {
        let identifier: SharedIdentifier = Arc::new(Mutex::new(simulation.identifier.clone()));
        let reveal_after_frames = simulation.reveal_after_ms / scanner.poll_interval_ms.max(1);

        Self {
            mode: scanner.mode,
            imaging: ImagingSettings {
                width: scanner.frame_width,
                height: scanner.frame_height,
                flip: scanner.flip,
                warmup: Duration::from_millis(scanner.warmup_ms),
            },
            tag_poll_interval: Duration::from_millis(scanner.tag_poll_interval_ms),
            simulation: simulation.clone(),
            decoder: Arc::new(SimulatedDecoder::new(
                identifier.clone(),
                simulation.success_rate,
                reveal_after_frames,
            )),
            identifier,
        }
    }

    pub fn identifier(&self) -> String {
        read_identifier(&self.identifier)
    }

    fn transceiver(&self) -> RadioReader<SimulatedTransceiver> {
        RadioReader::new(
            SimulatedTransceiver::new(
                self.identifier.clone(),
                self.simulation.success_rate,
                Duration::from_millis(self.simulation.reveal_after_ms),
            ),
            self.tag_poll_interval,
        )
    }
}

impl DeviceFactory for SimulatedDevices {
    fn open(&self) -> Result<ScanDevice, DeviceError> {
        Ok(match self.mode {
            ScannerMode::Barcode => ScanDevice::Imaging {
                camera: Box::new(ImagingCamera::new(
                    SimulatedSensor::default(),
                    self.imaging.clone(),
                )),
                decoder: self.decoder.clone(),
            },
            ScannerMode::Rfid => ScanDevice::Radio(Box::new(self.transceiver())),
        })
    }

    fn open_writer(&self) -> Result<Box<dyn TagWriter>, DeviceError> {
        Ok(Box::new(self.transceiver()))
    }
}
