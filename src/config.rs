//! Configuration management for the Shelfscan server

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Shipped in `config/default.toml`; only acceptable in dev
pub const PLACEHOLDER_SECRET: &str = "change-this-secret-in-production";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub scan_token_secret: String,
    pub scan_token_ttl_minutes: u64,
    /// `dev` relaxes cookie flags so the frontend can run over plain HTTP
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Which physical reader sits behind `/scan`
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScannerMode {
    Barcode,
    Rfid,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub mode: ScannerMode,
    pub scan_timeout_secs: u64,
    pub max_scan_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub grace_period_ms: u64,
    pub preview_interval_ms: u64,
    pub preview_idle_grace_ms: u64,
    pub release_timeout_ms: u64,
    pub tag_poll_interval_ms: u64,
    pub write_timeout_secs: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Camera is mounted upside down
    pub flip: bool,
    pub warmup_ms: u64,
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    pub identifier: String,
    pub success_rate: f64,
    pub reveal_after_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SHELFSCAN__SCANNER__MODE=rfid
            .add_source(
                Environment::with_prefix("SHELFSCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.scan_token_secret", env::var("SCAN_TOKEN_SECRET").ok())?
            .set_override_option("server.port", env::var("SHELFSCAN_PORT").ok())?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session manager cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.scan_token_secret.trim().is_empty() {
            return Err(ConfigError::Message("auth.scan_token_secret must not be empty".into()));
        }
        if !self.is_dev() && self.auth.scan_token_secret == PLACEHOLDER_SECRET {
            return Err(ConfigError::Message(
                "auth.scan_token_secret still has its placeholder value; set SCAN_TOKEN_SECRET".into(),
            ));
        }
        if self.auth.scan_token_ttl_minutes == 0 {
            return Err(ConfigError::Message("auth.scan_token_ttl_minutes must be positive".into()));
        }
        let scanner = &self.scanner;
        if scanner.poll_interval_ms == 0 || scanner.preview_interval_ms == 0 || scanner.tag_poll_interval_ms == 0 {
            return Err(ConfigError::Message("scanner intervals must be positive".into()));
        }
        if scanner.scan_timeout_secs == 0 || scanner.scan_timeout_secs > scanner.max_scan_timeout_secs {
            return Err(ConfigError::Message(
                "scanner.scan_timeout_secs must be between 1 and scanner.max_scan_timeout_secs".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.simulation.success_rate) {
            return Err(ConfigError::Message("simulation.success_rate must be within [0, 1]".into()));
        }
        Ok(())
    }

    pub fn is_dev(&self) -> bool {
        self.auth.environment.eq_ignore_ascii_case("dev")
    }
}

impl ScannerConfig {
    /// Clamp a caller-supplied timeout to the configured maximum
    pub fn resolve_timeout(&self, requested_secs: Option<u64>) -> Duration {
        let secs = requested_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(self.scan_timeout_secs)
            .min(self.max_scan_timeout_secs);
        Duration::from_secs(secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scan_token_secret: PLACEHOLDER_SECRET.to_string(),
            scan_token_ttl_minutes: 10,
            environment: "dev".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            mode: ScannerMode::Barcode,
            scan_timeout_secs: 30,
            max_scan_timeout_secs: 60,
            poll_interval_ms: 200,
            grace_period_ms: 5_000,
            preview_interval_ms: 100,
            preview_idle_grace_ms: 2_000,
            release_timeout_ms: 2_000,
            tag_poll_interval_ms: 100,
            write_timeout_secs: 10,
            frame_width: 640,
            frame_height: 480,
            flip: true,
            warmup_ms: 500,
            jpeg_quality: 80,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            identifier: "9786053609902".to_string(),
            success_rate: 0.8,
            reveal_after_ms: 1_500,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            scanner: ScannerConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}
