/*
 * Responsibility
 * - POST /token
 *   - client_credentials: access token (uma_protection を含めば PAT) を発行
 *     scope に openid があれば at_hash 付きの id_token も返す
 *   - urn:ietf:params:oauth:grant-type:uma-ticket: ticket を redeem して RPT + PCT を返す
 *     claims 不足なら 403 need_info (ticket は pending のまま)
 * - client 認証は Basic ヘッダ or body の client_id/client_secret
 */
use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;

use crate::{
    api::v1::{
        dto::token::{AccessTokenResponse, RptResponse, TokenRequest},
        extractors::RequestMeta,
    },
    error::AppError,
    services::{
        token::IdTokenRequest,
        uma::{
            RequestMetadata, UmaGrantOutcome, UmaGrantRequest, grant::UMA_TICKET_GRANT_TYPE,
        },
    },
    state::AppState,
};

const CLIENT_CREDENTIALS: &str = "client_credentials";
const OPENID_SCOPE: &str = "openid";

pub async fn token(
    State(state): State<AppState>,
    RequestMeta(metadata): RequestMeta,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Result<Response, AppError> {
    let (client_id, client_secret) = client_credentials(&headers, &req)?;
    let client = state.clients.authenticate(&client_id, &client_secret)?;
    let client_id = client.id().to_string();

    match req.grant_type.as_str() {
        CLIENT_CREDENTIALS => client_credentials_grant(&state, &client_id, &req),
        UMA_TICKET_GRANT_TYPE => uma_ticket_grant(&state, &client_id, req, metadata).await,
        other => {
            tracing::debug!(grant_type = other, "unsupported grant type");
            Err(AppError::UnsupportedGrantType)
        }
    }
}

fn client_credentials_grant(
    state: &AppState,
    client_id: &str,
    req: &TokenRequest,
) -> Result<Response, AppError> {
    let now = Utc::now();
    let scopes = req.scopes();
    let issued = state.access_tokens.issue(client_id, &scopes, now)?;

    let id_token = if scopes.iter().any(|s| s == OPENID_SCOPE) {
        Some(state.id_tokens.create(
            IdTokenRequest {
                subject: client_id,
                audience: client_id,
                access_token: Some(&issued.access_token),
                ..Default::default()
            },
            now,
        )?)
    } else {
        None
    };

    tracing::info!(client_id, scope = ?issued.scope, "access token issued");
    Ok(Json(AccessTokenResponse {
        access_token: issued.access_token,
        token_type: "Bearer",
        expires_in: issued.expires_in,
        scope: issued.scope,
        id_token,
    })
    .into_response())
}

async fn uma_ticket_grant(
    state: &AppState,
    client_id: &str,
    req: TokenRequest,
    metadata: RequestMetadata,
) -> Result<Response, AppError> {
    let ticket = req
        .ticket()
        .map_err(|m| AppError::bad_request("invalid_request", m))?
        .to_string();
    let claims = req
        .parsed_claims()
        .map_err(|m| AppError::bad_request("invalid_request", m))?;
    let scopes = req.scopes();

    let grant = UmaGrantRequest {
        ticket,
        scopes,
        claim_token: req.claim_token,
        claim_token_format: req.claim_token_format,
        pct: req.pct,
        rpt: req.rpt,
        claims,
        metadata,
    };

    let now = Utc::now();
    match state.uma.grant(client_id, grant, now).await? {
        UmaGrantOutcome::Issued { rpt, pct, upgraded } => Ok(Json(RptResponse {
            expires_in: (rpt.expires_at - now).num_seconds().max(0),
            access_token: rpt.code,
            token_type: "Bearer",
            pct: pct.code,
            upgraded,
        })
        .into_response()),
        UmaGrantOutcome::NeedInfo {
            ticket,
            pct,
            required_claims,
        } => Err(AppError::NeedInfo {
            ticket,
            pct,
            required_claims,
        }),
    }
}

/// `Authorization: Basic` first, then the form body.
fn client_credentials(headers: &HeaderMap, req: &TokenRequest) -> Result<(String, String), AppError> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let (scheme, encoded) = value.split_once(' ').ok_or(AppError::InvalidClient)?;
        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD
                .decode(encoded.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or(AppError::InvalidClient)?;
            let (id, secret) = decoded.split_once(':').ok_or(AppError::InvalidClient)?;
            return Ok((id.to_string(), secret.to_string()));
        }
    }

    match (req.client_id.as_deref(), req.client_secret.as_deref()) {
        (Some(id), Some(secret)) if !id.is_empty() => Ok((id.to_string(), secret.to_string())),
        _ => Err(AppError::InvalidClient),
    }
}
