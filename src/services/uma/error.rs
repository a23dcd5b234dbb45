use thiserror::Error;

use crate::repos::RepoError;
use crate::services::crypto::CryptoError;
use crate::services::token::TokenError;

#[derive(Debug, Error)]
pub enum UmaError {
    #[error("invalid ticket")]
    InvalidTicket,

    #[error("ticket expired")]
    ExpiredTicket,

    #[error("ticket already redeemed")]
    TicketConsumed,

    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("scope not registered on resource: {0}")]
    InvalidScope(String),

    #[error("invalid resource description: {0}")]
    InvalidResource(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("resource belongs to another client")]
    AccessDenied,

    #[error("invalid pct")]
    InvalidPct,

    #[error("invalid rpt")]
    InvalidRpt,

    #[error("unsupported claim_token_format")]
    InvalidClaimTokenFormat,

    #[error("invalid claim_token")]
    InvalidClaimToken,

    #[error("request denied")]
    RequestDenied,

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UmaError {
    /// Wire `error` code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTicket | Self::TicketConsumed => "invalid_ticket",
            Self::ExpiredTicket => "expired_ticket",
            Self::InvalidResourceId(_) => "invalid_resource_id",
            Self::ResourceNotFound(_) => "not_found",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidResource(_) | Self::InvalidRequest(_) => "invalid_request",
            Self::AccessDenied => "access_denied",
            Self::InvalidPct => "invalid_pct",
            Self::InvalidRpt => "invalid_rpt",
            Self::InvalidClaimTokenFormat => "invalid_claim_token_format",
            Self::InvalidClaimToken => "invalid_claim_token",
            Self::RequestDenied => "request_denied",
            Self::Repo(_) | Self::Token(_) | Self::Crypto(_) | Self::Serialization(_) => {
                "server_error"
            }
        }
    }

    pub fn is_internal(&self) -> bool {
        self.error_code() == "server_error"
    }
}
