//! # HTTP Handlers
//!
//! One handler per endpoint. Handlers translate between JSON and the
//! repository; all decisions about sources, fallback and invalidation live
//! in `product_persistence`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use product_domain::{
    ConsistencyReport, HealthReport, Invalidation, Product, ProductDraft, ReadSource,
    STALE_READ_NOTE,
};
use serde::Serialize;

use crate::context::ApiContext;
use crate::error::ApiResult;

// =============================================================================
// RESPONSE BODIES
// =============================================================================

/// Body of a single-product read.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub source: ReadSource,
    pub data: Product,
}

/// Body of a list read.
#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub source: ReadSource,
    pub data: Vec<Product>,
}

/// Body of a committed update.
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub message: &'static str,
    pub data: Product,
    pub note: &'static str,
    pub cache_invalidation: Invalidation,
}

/// Body of a created product.
#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub message: &'static str,
    pub data: Product,
}

/// Body of a health check.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub healthy: bool,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /products/{id}`
pub async fn get_product(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProductResponse>> {
    let (data, source) = ctx.repo.get(id).await?;
    Ok(Json(ProductResponse { source, data }))
}

/// `PUT /products/{id}`
pub async fn update_product(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    payload: Result<Json<ProductDraft>, JsonRejection>,
) -> ApiResult<Json<UpdateResponse>> {
    let Json(draft) = payload?;
    let outcome = ctx.repo.update(id, &draft).await?;
    Ok(Json(UpdateResponse {
        message: "Product updated",
        data: outcome.product,
        note: STALE_READ_NOTE,
        cache_invalidation: outcome.invalidation,
    }))
}

/// `POST /products`
pub async fn create_product(
    State(ctx): State<ApiContext>,
    payload: Result<Json<ProductDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateResponse>)> {
    let Json(draft) = payload?;
    let data = ctx.repo.create(&draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            message: "Product created",
            data,
        }),
    ))
}

/// `GET /products`
pub async fn list_products(State(ctx): State<ApiContext>) -> ApiResult<Json<ProductListResponse>> {
    let data = ctx.repo.list().await?;
    Ok(Json(ProductListResponse {
        source: ReadSource::Replica,
        data,
    }))
}

/// `POST /test-consistency/{id}`
pub async fn test_consistency(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    payload: Result<Json<ProductDraft>, JsonRejection>,
) -> ApiResult<Json<ConsistencyReport>> {
    let Json(draft) = payload?;
    let report = ctx.probe.run(id, &draft).await?;
    Ok(Json(report))
}

/// `GET /health`
pub async fn health_check(State(ctx): State<ApiContext>) -> impl IntoResponse {
    let report = ctx.health.check().await;
    let healthy = report.is_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(HealthResponse { report, healthy }))
}
