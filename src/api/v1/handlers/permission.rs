/*
 * Responsibility
 * - POST /uma/permission (PAT 必須)
 * - resource server が拒否/不足したアクセスの permission を受け、ticket を返す
 */
use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;

use crate::{
    api::v1::{
        dto::permission::{PermissionBody, TicketResponse},
        extractors::AuthCtxExtractor,
    },
    error::AppError,
    state::AppState,
};

pub async fn create_permission(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(body): Json<PermissionBody>,
) -> Result<(StatusCode, Json<TicketResponse>), AppError> {
    let ticket = state
        .tickets
        .request_ticket(&ctx.client_id, body.into_requests(), Utc::now())?;

    Ok((StatusCode::CREATED, Json(TicketResponse { ticket: ticket.id })))
}
