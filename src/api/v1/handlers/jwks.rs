/*
 * Responsibility
 * - GET /jwks (公開中の検証鍵, alg allow-list で filter 済み)
 * - GET /jwks/archived?kid= (rotation で退役した鍵を 1 件)
 * - HMAC 鍵は公開表現を持たないので archived でも not_found
 */
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{error::AppError, services::keys::JwkSet, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ArchivedKeyQuery {
    #[serde(default)]
    pub kid: String,
}

pub async fn jwks(State(state): State<AppState>) -> Json<JwkSet> {
    Json(state.keys.jwks())
}

pub async fn archived_key(
    State(state): State<AppState>,
    Query(query): Query<ArchivedKeyQuery>,
) -> Result<Json<Map<String, Value>>, AppError> {
    let key = state.keys.archived_key(&query.kid)?;
    let jwk = key.public_jwk().ok_or(AppError::not_found("key"))?;
    Ok(Json(jwk))
}
