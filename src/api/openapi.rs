//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification of the control plane using utoipa for
//! compile-time spec generation. Served at `/openapi.json`.

use utoipa::OpenApi;

/// OpenAPI documentation for the mangadex-cbz control plane
#[derive(OpenApi)]
#[openapi(
    info(
        title = "mangadex-cbz control plane",
        version = "0.1.0",
        description = "Loopback-only HTTP API for searching MangaDex and building CBZ archives as pollable background jobs",
        license(
            name = "GPL-3.0-or-later"
        )
    ),
    servers(
        (url = "http://127.0.0.1:50051", description = "Local server")
    ),
    paths(
        // Catalog
        crate::api::routes::search,
        crate::api::routes::manga_page,

        // Tasks
        crate::api::routes::to_cbz,
        crate::api::routes::task_status,

        // Download
        crate::api::routes::download,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::catalog::SearchSummary,
        crate::catalog::MangaInfo,
        crate::jobs::CbzRequest,
        crate::jobs::JobSnapshot,
        crate::jobs::JobStats,
        crate::api::routes::HealthResponse,
        crate::error::ApiError,
        crate::error::ErrorDetail,
        crate::error::JobFailure,
        crate::config::Config,
        crate::config::FetchConfig,
        crate::config::JobConfig,
        crate::config::CatalogConfig,
        crate::config::ApiConfig,
    )),
    tags(
        (name = "catalog", description = "Search and manga pages"),
        (name = "tasks", description = "Archive jobs and status polling"),
        (name = "download", description = "Finished archives"),
        (name = "system", description = "Health and API documentation")
    )
)]
pub struct ApiDoc;
