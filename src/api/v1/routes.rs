/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /token は client 認証のみ、/uma/... は PAT 必須 (middleware::auth::access を route 単位で適用)
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::auth::access;
use crate::state::AppState;

use crate::api::v1::handlers::{
    introspection::introspect_rpt,
    permission::create_permission,
    resources::{create_resource, delete_resource, get_resource, list_resources, update_resource},
    token::token,
};

pub fn routes(state: AppState) -> Router<AppState> {
    let protection = Router::new()
        .route("/uma/resources", get(list_resources).post(create_resource))
        .route(
            "/uma/resources/{resource_id}",
            get(get_resource).put(update_resource).delete(delete_resource),
        )
        .route("/uma/permission", post(create_permission))
        .route("/uma/rpt/introspect", post(introspect_rpt));

    Router::new()
        .route("/token", post(token))
        .merge(access::apply(protection, state))
}
