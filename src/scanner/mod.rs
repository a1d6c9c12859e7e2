//! Scan hardware, session arbitration and payload decoding

pub mod cancel;
pub mod device;
pub mod frame;
pub mod imaging;
pub mod indicator;
pub mod isbn;
pub mod ndef;
pub mod radio;
pub mod session;
pub mod simulated;
pub mod teardown;
mod worker;

pub use device::{DeviceError, DeviceFactory, ScanDevice};
pub use indicator::{Indicator, PinIndicator, SignalKind};
pub use session::{
    ScanOutcome, ScanReport, ScanSessionManager, SessionState, SessionStatus, SessionTimings,
};
pub use simulated::SimulatedDevices;
