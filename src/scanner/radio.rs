//! Short-range radio adapter: tag sensing with cooperative cancellation

use std::time::{Duration, Instant};

use super::device::{CaptureDevice, DeviceError, TagReader, TagWriter};
use super::ndef;

/// Raw transceiver driver (serial NFC frontend or similar)
pub trait Transceiver: Send {
    fn open(&mut self) -> Result<(), DeviceError>;
    fn close(&mut self);
    /// Wait at most `window` for a tag and return its NDEF message
    fn sense(&mut self, window: Duration) -> Result<Option<Vec<u8>>, DeviceError>;
    /// Wait at most `window` for a tag and overwrite its NDEF message
    fn write_ndef(&mut self, message: &[u8], window: Duration) -> Result<bool, DeviceError>;
}

/// [`TagReader`] / [`TagWriter`] over a [`Transceiver`]
///
/// The blocking calls slice their timeout into `poll_interval` windows and
/// consult the cancel predicate between windows, so a disconnecting client
/// releases the reader within one interval.
pub struct RadioReader<T: Transceiver> {
    transceiver: T,
    poll_interval: Duration,
    open: bool,
}

impl<T: Transceiver> RadioReader<T> {
    pub fn new(transceiver: T, poll_interval: Duration) -> Self {
        Self {
            transceiver,
            poll_interval,
            open: false,
        }
    }

    fn ensure_open(&mut self) -> Result<(), DeviceError> {
        if !self.open {
            self.start()?;
        }
        Ok(())
    }

    fn next_window(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| remaining.min(self.poll_interval))
    }
}

impl<T: Transceiver> CaptureDevice for RadioReader<T> {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.transceiver.open()?;
        self.open = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.open {
            self.transceiver.close();
            self.open = false;
        }
    }
}

impl<T: Transceiver> TagReader for RadioReader<T> {
    fn blocking_read(
        &mut self,
        cancel: &dyn Fn() -> bool,
        timeout: Duration,
    ) -> Result<Option<String>, DeviceError> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;

        while !cancel() {
            let Some(window) = self.next_window(deadline) else {
                break;
            };
            let window_started = Instant::now();
            let Some(message) = self.transceiver.sense(window)? else {
                continue;
            };

            match ndef::first_text(&message) {
                Ok(Some(text)) => return Ok(Some(text.trim().to_string())),
                Ok(None) => tracing::debug!("Tag presented without a text record"),
                Err(e) => tracing::debug!("Unreadable tag content: {}", e),
            }
            // The same tag answers again at once while it stays in the field
            std::thread::sleep(window.saturating_sub(window_started.elapsed()));
        }

        Ok(None)
    }
}

impl<T: Transceiver> TagWriter for RadioReader<T> {
    fn write_text(
        &mut self,
        text: &str,
        cancel: &dyn Fn() -> bool,
        timeout: Duration,
    ) -> Result<bool, DeviceError> {
        let message = ndef::encode_text_message(text)
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;

        while !cancel() {
            let Some(window) = self.next_window(deadline) else {
                break;
            };
            if self.transceiver.write_ndef(&message, window)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}
