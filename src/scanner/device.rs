//! Capture and decode adapter contracts
//!
//! Everything in this module is blocking and runs on the scan worker
//! thread. Drivers for a concrete sensor, barcode decoder or tag
//! transceiver plug in through [`FrameSource`](super::imaging::FrameSource),
//! [`FrameDecoder`] and [`Transceiver`](super::radio::Transceiver).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::frame::{Frame, Polygon};

/// Faults raised by the hardware adapters or by the arbiter itself
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("scanner is busy")]
    Busy,

    #[error("previous session is still releasing the device")]
    ReleasePending,

    #[error("failed to open device: {0}")]
    Open(String),

    #[error("device transport error: {0}")]
    Transport(String),

    #[error("operation not supported by this device: {0}")]
    Unsupported(&'static str),

    #[error("scan worker failed: {0}")]
    Worker(String),
}

impl DeviceError {
    /// Rejections of a trigger, as opposed to faults of a running session
    pub fn is_rejection(&self) -> bool {
        matches!(self, DeviceError::Busy | DeviceError::ReleasePending)
    }
}

/// Lifecycle shared by every physical reader
pub trait CaptureDevice: Send {
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Must be safe to call more than once
    fn stop(&mut self);
}

/// Imaging path: returns the newest frame, already orientation-corrected
pub trait Camera: CaptureDevice {
    fn capture_frame(&mut self) -> Result<Frame, DeviceError>;
}

/// Radio path: one long blocking read, cancelled through `cancel`
pub trait TagReader: CaptureDevice {
    /// `Ok(None)` on timeout or cancellation, the tag text on success
    fn blocking_read(
        &mut self,
        cancel: &dyn Fn() -> bool,
        timeout: Duration,
    ) -> Result<Option<String>, DeviceError>;
}

/// Provisioning path used by `/scan/write`
pub trait TagWriter: CaptureDevice {
    /// `Ok(false)` when no tag was presented before the timeout
    fn write_text(
        &mut self,
        text: &str,
        cancel: &dyn Fn() -> bool,
        timeout: Duration,
    ) -> Result<bool, DeviceError>;
}

/// A text payload found on a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDecode {
    pub text: String,
    pub polygon: Option<Polygon>,
}

#[cfg_attr(test, mockall::automock)]
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Vec<CandidateDecode>;
}

/// An opened reader, owned by exactly one session at a time
pub enum ScanDevice {
    Imaging {
        camera: Box<dyn Camera>,
        decoder: Arc<dyn FrameDecoder>,
    },
    Radio(Box<dyn TagReader>),
}

impl ScanDevice {
    pub fn start(&mut self) -> Result<(), DeviceError> {
        match self {
            ScanDevice::Imaging { camera, .. } => camera.start(),
            ScanDevice::Radio(reader) => reader.start(),
        }
    }

    /// Stop the device and drop the handle
    pub fn release(self) {
        match self {
            ScanDevice::Imaging { mut camera, .. } => camera.stop(),
            ScanDevice::Radio(mut reader) => reader.stop(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScanDevice::Imaging { .. } => "imaging",
            ScanDevice::Radio(_) => "radio",
        }
    }
}

impl std::fmt::Debug for ScanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScanDevice").field(&self.kind()).finish()
    }
}

/// Opens the physical reader for a new session
pub trait DeviceFactory: Send + Sync {
    fn open(&self) -> Result<ScanDevice, DeviceError>;

    fn open_writer(&self) -> Result<Box<dyn TagWriter>, DeviceError> {
        Err(DeviceError::Unsupported("tag writing"))
    }
}
