/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / OAuth 形式の JSON error body)
 * - UmaError / KeyError / TokenError / ClientError / ConfigError を統一的に変換
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::services::clients::ClientError;
use crate::services::keys::KeyError;
use crate::services::token::TokenError;
use crate::services::uma::UmaError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct NeedInfoResponse {
    error: &'static str,
    ticket: String,
    pct: String,
    required_claims: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("invalid client")]
    InvalidClient,
    #[error("unauthorized client")]
    Unauthorized,
    #[error("insufficient scope")]
    InsufficientScope,
    #[error("unsupported grant type")]
    UnsupportedGrantType,
    #[error("not found: {resource}")]
    NotFound { resource: &'static str },
    #[error("need info")]
    NeedInfo {
        ticket: String,
        pct: String,
        required_claims: Vec<String>,
    },
    #[error(transparent)]
    Uma(UmaError),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    /// Wire `error` code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest { code, .. } => *code,
            AppError::InvalidClient => "invalid_client",
            AppError::Unauthorized => "unauthorized_client",
            AppError::InsufficientScope => "invalid_client_scope",
            AppError::UnsupportedGrantType => "unsupported_grant_type",
            AppError::NotFound { .. } => "not_found",
            AppError::NeedInfo { .. } => "need_info",
            AppError::Uma(err) => err.error_code(),
            AppError::Config(_) | AppError::Internal => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "invalid_client" | "unauthorized_client" | "invalid_pct" => StatusCode::UNAUTHORIZED,
            "access_denied" | "request_denied" | "need_info" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "invalid_client_scope" => StatusCode::NOT_ACCEPTABLE,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let description = match self {
            AppError::NeedInfo {
                ticket,
                pct,
                required_claims,
            } => {
                let body = NeedInfoResponse {
                    error: code,
                    ticket,
                    pct,
                    required_claims,
                };
                return (status, Json(body)).into_response();
            }
            AppError::BadRequest { message, .. } => Some(message),
            AppError::NotFound { resource } => Some(format!("{resource} not found.")),
            AppError::Uma(err) if err.is_internal() => {
                error!(error = %err, "uma request failed");
                None
            }
            AppError::Uma(err) => Some(err.to_string()),
            AppError::Config(err) => {
                error!(error = %err, "configuration error");
                None
            }
            AppError::Internal => None,
            other => Some(other.to_string()),
        };

        let body = ErrorResponse {
            error: code,
            error_description: description,
        };

        (status, Json(body)).into_response()
    }
}

impl From<UmaError> for AppError {
    fn from(e: UmaError) -> Self {
        AppError::Uma(e)
    }
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::InvalidCredentials => AppError::InvalidClient,
        }
    }
}

impl From<KeyError> for AppError {
    fn from(e: KeyError) -> Self {
        match e {
            // Client supplied an unknown or blank kid (/jwks/archived)
            KeyError::NotFound(_) => AppError::not_found("key"),
            KeyError::NoActiveKey(_) | KeyError::Crypto(_) => {
                error!(error = %e, "key registry failure");
                AppError::Internal
            }
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Key(_)
            | TokenError::Crypto(_)
            | TokenError::Serialization(_)
            | TokenError::UnsupportedAlgorithm(_) => {
                error!(error = %e, "token signing failed");
                AppError::Internal
            }
            // Everything else is a rejected bearer token.
            _ => AppError::Unauthorized,
        }
    }
}
