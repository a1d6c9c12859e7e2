//! Shelfscan Server
//!
//! Scanning desk for a self-service library: arbitrates one barcode camera
//! or radio tag reader between scan requests and live preview viewers, and
//! issues short-lived tokens proving an item was physically scanned.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod scanner;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
