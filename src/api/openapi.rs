//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, scan};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shelfscan API",
        version = "0.3.0",
        description = "Self-service scanning desk: item scanning, live preview and scan tokens"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Scan
        scan::trigger_scan,
        scan::preview,
        scan::status,
        scan::cancel,
        scan::write_tag,
        scan::verify,
    ),
    components(
        schemas(
            // Health
            health::HealthResponse,
            health::ReadinessResponse,
            // Scan
            scan::ScanResponse,
            scan::CancelResponse,
            scan::WriteTagResponse,
            scan::VerifyResponse,
            crate::models::scan::WriteTagRequest,
            crate::scanner::SessionState,
            crate::scanner::SessionStatus,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "scan", description = "Item scanning and tag provisioning")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
