//! PAT (protection API token) 検証 → AuthCtx を extensions に入れる
//!
//! - `Authorization: Bearer <jwt>` を AccessTokenService で検証する
//!   (署名 / kid は active → archived の順に解決、exp/nbf は leeway 付き)
//! - `uma_protection` scope が無い token は 406 invalid_client_scope
//! - 成功時は AuthCtx (client_id / subject / scopes / jti) を extensions に格納

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};
use chrono::Utc;

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::state::AppState;

pub const PROTECTION_SCOPE: &str = "uma_protection";

/// UMA protection endpoints (resource registration, permission, introspection)
/// に PAT 認証を掛ける。
///
/// ```ignore
/// let protected = Router::new().route("/uma/permission", post(create_permission));
/// let protected = middleware::auth::access::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or(AppError::Unauthorized)?;

    let verified = match state.access_tokens.verify(token, Utc::now()) {
        Ok(verified) => verified,
        Err(err) => {
            tracing::warn!(error = %err, "protection api token verification failed");
            return Err(AppError::Unauthorized);
        }
    };

    if !verified.has_scope(PROTECTION_SCOPE) {
        tracing::warn!(client_id = %verified.client_id, "token lacks uma_protection scope");
        return Err(AppError::InsufficientScope);
    }

    let auth_ctx = AuthCtx::from(verified);

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(auth_ctx);

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
