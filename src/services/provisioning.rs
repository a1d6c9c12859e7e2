//! Tag provisioning: writing an identifier onto a presented radio tag

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult},
    scanner::{Indicator, ScanSessionManager, SignalKind},
};

/// Result of a write attempt that reached the hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    TagWritten { text: String },
    /// No tag was presented before the write timeout
    NoTag,
}

#[derive(Clone)]
pub struct ProvisioningService {
    scanner: ScanSessionManager,
    indicator: Arc<dyn Indicator>,
    write_timeout: Duration,
}

impl ProvisioningService {
    pub fn new(
        scanner: ScanSessionManager,
        indicator: Arc<dyn Indicator>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            scanner,
            indicator,
            write_timeout,
        }
    }

    /// Write `text` as a single NDEF Text record.
    ///
    /// Holds the reader exclusively for the duration of the write; the write
    /// is abandoned within one tag poll interval if this future is dropped.
    pub async fn write_tag(&self, text: &str) -> AppResult<WriteOutcome> {
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let payload = text.to_string();
        let timeout = self.write_timeout;
        let written = self
            .scanner
            .with_exclusive_device(move |devices| {
                let mut writer = devices.open_writer()?;
                let written = writer.write_text(&payload, &|| cancel.is_cancelled(), timeout);
                writer.stop();
                written
            })
            .await
            .and_then(|written| written);

        match written {
            Ok(true) => {
                tracing::info!("Wrote {:?} to tag", text);
                self.indicator.signal(SignalKind::Success).await;
                Ok(WriteOutcome::TagWritten {
                    text: text.to_string(),
                })
            }
            Ok(false) => {
                tracing::warn!("No tag presented within {:?}", timeout);
                self.indicator.signal(SignalKind::Failure).await;
                Ok(WriteOutcome::NoTag)
            }
            Err(e) if e.is_rejection() => {
                tracing::info!("Tag write rejected: {}", e);
                Err(AppError::Conflict(e.to_string()))
            }
            Err(e) => {
                self.indicator.signal(SignalKind::Failure).await;
                Err(AppError::Device(e.to_string()))
            }
        }
    }
}
