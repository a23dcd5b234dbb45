/*
 * Responsibility
 * - POST /uma/rpt/introspect (PAT 必須)
 * - 有効な RPT なら permission 一覧、それ以外は {"active": false}
 */
use axum::{Form, Json, extract::State};
use chrono::Utc;

use crate::{
    api::v1::{
        dto::introspection::{IntrospectionRequest, IntrospectionResponse},
        extractors::AuthCtxExtractor,
    },
    error::AppError,
    state::AppState,
};

pub async fn introspect_rpt(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Form(req): Form<IntrospectionRequest>,
) -> Result<Json<IntrospectionResponse>, AppError> {
    let response = match state.rpts.introspect(&req.token, Utc::now())? {
        Some(rpt) => IntrospectionResponse::from(rpt),
        None => {
            tracing::debug!(client_id = %ctx.client_id, "introspected inactive rpt");
            IntrospectionResponse::inactive()
        }
    };
    Ok(Json(response))
}
