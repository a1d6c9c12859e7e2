//! Business logic services

pub mod provisioning;
pub mod scan_token;

use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::AppConfig,
    scanner::{DeviceFactory, Indicator, ScanSessionManager, SessionTimings},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub scanner: ScanSessionManager,
    pub tokens: scan_token::ScanTokenService,
    pub provisioning: provisioning::ProvisioningService,
}

impl Services {
    /// Wire the services around one physical reader and its indicator
    pub fn new(
        config: &AppConfig,
        devices: Arc<dyn DeviceFactory>,
        indicator: Arc<dyn Indicator>,
    ) -> Self {
        let tokens = scan_token::ScanTokenService::new(&config.auth);
        let scanner = ScanSessionManager::new(
            SessionTimings::from(&config.scanner),
            devices,
            indicator.clone(),
            tokens.clone(),
        );
        let provisioning = provisioning::ProvisioningService::new(
            scanner.clone(),
            indicator,
            Duration::from_secs(config.scanner.write_timeout_secs),
        );

        Self {
            scanner,
            tokens,
            provisioning,
        }
    }
}
