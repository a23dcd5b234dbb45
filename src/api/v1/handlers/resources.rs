/*
 * Responsibility
 * - /uma/resources 系 CRUD handler (PAT 必須)
 * - Path/Json を extractor で受け、DTO → ResourceDraft → ResourceRegistry 呼び出し
 * - owner は PAT の subject, 登録 client は PAT の client_id
 */
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;

use crate::{
    api::v1::{
        dto::resources::{ListResourcesQuery, ResourceIdResponse, ResourceRequest, ResourceResponse},
        extractors::AuthCtxExtractor,
    },
    error::AppError,
    state::AppState,
};

pub async fn create_resource(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<ResourceRequest>,
) -> Result<(StatusCode, Json<ResourceIdResponse>), AppError> {
    let resource = state.resources.register(
        &ctx.subject,
        &ctx.client_id,
        req.into_draft(),
        Utc::now(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(ResourceIdResponse { id: resource.id }),
    ))
}

pub async fn list_resources(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Query(query): Query<ListResourcesQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let scope = query.scope.as_deref().filter(|s| !s.trim().is_empty());
    let ids = state
        .resources
        .list(&ctx.client_id, scope)?
        .into_iter()
        .map(|r| r.id)
        .collect();

    Ok(Json(ids))
}

pub async fn get_resource(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Path(resource_id): Path<String>,
) -> Result<Json<ResourceResponse>, AppError> {
    let resource = state.resources.get(&ctx.client_id, &resource_id)?;
    Ok(Json(resource.into()))
}

pub async fn update_resource(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Path(resource_id): Path<String>,
    Json(req): Json<ResourceRequest>,
) -> Result<Json<ResourceIdResponse>, AppError> {
    let resource = state.resources.update(
        &ctx.client_id,
        &resource_id,
        req.into_draft(),
        Utc::now(),
    )?;

    Ok(Json(ResourceIdResponse { id: resource.id }))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Path(resource_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.resources.delete(&ctx.client_id, &resource_id)?;
    Ok(StatusCode::NO_CONTENT)
}
