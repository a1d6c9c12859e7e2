//! API handlers for Shelfscan REST endpoints

pub mod health;
pub mod openapi;
pub mod scan;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::{AppError, AppResult},
    scanner::isbn::normalize_isbn,
    services::scan_token::{SCAN_COOKIE, SCAN_TOKEN_HEADER},
    AppState,
};

/// Extractor for a verified scan of a physical item.
///
/// Reads the capability token from the `scanned_book` cookie, falling back
/// to the `x-scan-token` header. Borrow and return handlers take this and
/// call [`ScannedItem::require_item`] with the identifier they act on.
#[derive(Debug, Clone)]
pub struct ScannedItem(pub String);

impl ScannedItem {
    pub fn identifier(&self) -> &str {
        &self.0
    }

    /// Check that the scanned item is `identifier`
    pub fn require_item(&self, identifier: &str) -> AppResult<()> {
        if normalize_isbn(identifier) == self.0 {
            Ok(())
        } else {
            Err(AppError::ItemMismatch(
                "The scanned book does not match the requested item".to_string(),
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ScannedItem {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SCAN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(SCAN_TOKEN_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .ok_or_else(|| AppError::TokenInvalid("Missing scan token".to_string()))?;

        let identifier = state.services.tokens.verify(&token)?;
        Ok(ScannedItem(identifier))
    }
}

/// Cookie carrying a freshly issued scan token.
///
/// Development hosts serve plain HTTP on the same site as the frontend;
/// production serves the frontend cross-site over TLS.
pub fn scan_cookie(token: String, dev: bool) -> Cookie<'static> {
    Cookie::build((SCAN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(!dev)
        .same_site(if dev { SameSite::Lax } else { SameSite::None })
        .build()
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Scanning
        .route("/scan", get(scan::trigger_scan))
        .route("/scan/preview", get(scan::preview))
        .route("/scan/status", get(scan::status))
        .route("/scan/cancel", post(scan::cancel))
        .route("/scan/write", post(scan::write_tag))
        .route("/scan/verify/:id", get(scan::verify))
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
