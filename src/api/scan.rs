//! Scan endpoints: trigger, live preview, cancellation and tag provisioning

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::scan::{ScanQuery, WriteTagRequest},
    scanner::{ScanOutcome, SessionStatus},
    services::{provisioning::WriteOutcome, scan_token::SCAN_TOKEN_HEADER},
    AppState,
};

use super::{scan_cookie, ScannedItem};

const PREVIEW_BOUNDARY: &str = "frame";

/// Successful scan
#[derive(Serialize, ToSchema)]
pub struct ScanResponse {
    /// Normalized ISBN of the scanned item
    pub identifier: String,
    pub message: String,
    /// Expiry of the issued scan token
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct CancelResponse {
    /// False when no scan was in progress
    pub cancelled: bool,
}

#[derive(Serialize, ToSchema)]
pub struct WriteTagResponse {
    pub code: u32,
    pub message: String,
    /// Text now stored on the tag
    pub data: String,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyResponse {
    pub identifier: String,
    pub verified: bool,
}

/// Scan one item and issue a scan token
///
/// Blocks until a valid ISBN is read, the timeout expires or the scan is
/// cancelled. Closing the connection cancels the scan.
#[utoipa::path(
    get,
    path = "/scan",
    tag = "scan",
    params(ScanQuery),
    responses(
        (status = 200, description = "Item scanned, token set as cookie and header", body = ScanResponse),
        (status = 408, description = "No valid identifier before timeout", body = crate::error::ErrorResponse),
        (status = 409, description = "Scanner busy or still releasing", body = crate::error::ErrorResponse),
        (status = 499, description = "Scan cancelled"),
        (status = 500, description = "Device failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn trigger_scan(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<ScanQuery>,
) -> AppResult<impl IntoResponse> {
    let timeout = state.config.scanner.resolve_timeout(query.timeout_secs);

    // Dropped with this future when the client disconnects
    let cancel = CancellationToken::new();
    let _cancel_on_disconnect = cancel.clone().drop_guard();

    let report = state.services.scanner.trigger_scan(timeout, cancel).await;

    match report.outcome {
        ScanOutcome::Found { identifier } => {
            let issued = report.token.ok_or_else(|| {
                AppError::Internal(format!("No scan token issued for {}", identifier))
            })?;

            let jar = jar.add(scan_cookie(issued.token.clone(), state.config.is_dev()));
            Ok((
                jar,
                [(SCAN_TOKEN_HEADER, issued.token)],
                Json(ScanResponse {
                    identifier: issued.identifier,
                    message: "Book scanned successfully".to_string(),
                    expires_at: issued.expires_at,
                }),
            ))
        }
        ScanOutcome::TimedOut => Err(AppError::ScanTimeout(
            "No valid ISBN detected before timeout".to_string(),
        )),
        ScanOutcome::Cancelled => Err(AppError::ScanCancelled),
        ScanOutcome::DeviceError(e) => Err(e.into()),
    }
}

/// Live camera preview as an MJPEG stream
#[utoipa::path(
    get,
    path = "/scan/preview",
    tag = "scan",
    responses(
        (status = 200, description = "multipart/x-mixed-replace stream of JPEG frames")
    )
)]
pub async fn preview(State(state): State<AppState>) -> impl IntoResponse {
    let parts = state
        .services
        .scanner
        .preview_frames()
        .map(|jpeg| Ok::<_, Infallible>(multipart_part(&jpeg)));

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", PREVIEW_BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
}

/// Current scan session snapshot
#[utoipa::path(
    get,
    path = "/scan/status",
    tag = "scan",
    responses(
        (status = 200, description = "Session state", body = SessionStatus)
    )
)]
pub async fn status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.services.scanner.status())
}

/// Cancel the scan in progress, if any
#[utoipa::path(
    post,
    path = "/scan/cancel",
    tag = "scan",
    responses(
        (status = 200, description = "Whether a scan was cancelled", body = CancelResponse)
    )
)]
pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.services.scanner.cancel_current_scan(),
    })
}

/// Write an identifier onto the next presented tag
#[utoipa::path(
    post,
    path = "/scan/write",
    tag = "scan",
    request_body = WriteTagRequest,
    responses(
        (status = 200, description = "Tag written", body = WriteTagResponse),
        (status = 400, description = "Invalid text", body = crate::error::ErrorResponse),
        (status = 408, description = "No tag presented", body = crate::error::ErrorResponse),
        (status = 409, description = "Scanner busy", body = crate::error::ErrorResponse),
        (status = 500, description = "Device failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn write_tag(
    State(state): State<AppState>,
    Json(request): Json<WriteTagRequest>,
) -> AppResult<Json<WriteTagResponse>> {
    request.validate()?;

    match state.services.provisioning.write_tag(&request.text).await? {
        WriteOutcome::TagWritten { text } => Ok(Json(WriteTagResponse {
            code: ErrorCode::Success as u32,
            message: "Successfully wrote the data to the tag".to_string(),
            data: text,
        })),
        WriteOutcome::NoTag => Err(AppError::ScanTimeout(
            "No writable tag presented before timeout".to_string(),
        )),
    }
}

/// Check that the presented scan token covers item `id`
#[utoipa::path(
    get,
    path = "/scan/verify/{id}",
    tag = "scan",
    params(
        ("id" = String, Path, description = "ISBN of the item being borrowed or returned")
    ),
    responses(
        (status = 200, description = "Token valid for this item", body = VerifyResponse),
        (status = 401, description = "Missing, expired or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Token issued for another item", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify(scanned: ScannedItem, Path(id): Path<String>) -> AppResult<Json<VerifyResponse>> {
    scanned.require_item(&id)?;

    Ok(Json(VerifyResponse {
        identifier: scanned.0,
        verified: true,
    }))
}

fn multipart_part(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        PREVIEW_BOUNDARY,
        jpeg.len()
    );
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}
