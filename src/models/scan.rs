//! Scan request models

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Query parameters of a scan trigger
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScanQuery {
    /// Seconds to wait for a readable item; clamped to the configured maximum
    pub timeout_secs: Option<u64>,
}

/// Tag provisioning request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WriteTagRequest {
    /// Text to store on the tag, usually an ISBN
    #[validate(length(min = 1, max = 64, message = "Text must be between 1 and 64 characters"))]
    pub text: String,
}
