mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uma_server::app;

const FORM: &str = "application/x-www-form-urlencoded";
const UMA_TICKET: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

fn router() -> Router {
    app::build_router(common::state())
}

fn form(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_form(uri: &str, pairs: &[(&str, &str)], bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, FORM);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(form(pairs))).unwrap()
}

fn json_request(method: Method, uri: &str, body: Value, bearer: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn client_token(app: &Router, (id, secret): (&str, &str), scope: &str) -> Value {
    let (status, body) = send(
        app,
        post_form(
            "/api/v1/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", id),
                ("client_secret", secret),
                ("scope", scope),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

async fn pat(app: &Router) -> String {
    client_token(app, common::RS, "uma_protection").await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_and_request_id() {
    let app = router();
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "abc-123");

    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn jwks_publishes_only_public_keys() {
    let app = router();
    let (status, body) = send(&app, Request::builder().uri("/jwks").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["alg"], "ES256");
    assert!(keys[0].get("d").is_none());

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/jwks/archived?kid=unknown")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(
        &app,
        Request::builder().uri("/jwks/archived").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn token_endpoint_authenticates_clients() {
    let app = router();
    let (status, body) = send(
        &app,
        post_form(
            "/api/v1/token",
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "rs"),
                ("client_secret", "wrong"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_client");

    let (status, body) = send(
        &app,
        post_form(
            "/api/v1/token",
            &[
                ("grant_type", "password"),
                ("client_id", "rs"),
                ("client_secret", "rs-secret"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_grant_type");

    let body = client_token(&app, common::RS, "uma_protection openid").await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "uma_protection openid");
    assert!(body["id_token"].as_str().is_some());
}

#[tokio::test]
async fn protection_endpoints_require_pat() {
    let app = router();
    let resource = json!({ "name": "album", "resource_scopes": ["view"] });

    let (status, body) = send(
        &app,
        Request::builder()
            .method(Method::GET)
            .uri("/api/v1/uma/resources")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized_client");

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/v1/uma/resources", resource.clone(), "not-a-jwt"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let plain = client_token(&app, common::RS, "profile").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/uma/resources", resource, &plain),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(body["error"], "invalid_client_scope");
}

#[tokio::test]
async fn resource_crud() {
    let app = router();
    let pat = pat(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/uma/resources",
            json!({
                "name": "album",
                "icon_uri": "https://rs.example/album.png",
                "resource_scopes": ["view", "edit"],
                "type": "photo-album"
            }),
            &pat,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/v1/uma/resources", json!({ "name": "x" }), &pat),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let uri = format!("/api/v1/uma/resources/{id}");
    let (status, body) = send(&app, json_request(Method::GET, &uri, Value::Null, &pat)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "album");
    assert_eq!(body["type"], "photo-album");
    assert_eq!(body["resource_scopes"], json!(["edit", "view"]));

    let (status, body) = send(
        &app,
        json_request(
            Method::PUT,
            &uri,
            json!({ "name": "album 2", "resource_scopes": ["view"] }),
            &pat,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["_id"], id.as_str());

    let (status, body) = send(
        &app,
        json_request(Method::GET, "/api/v1/uma/resources?scope=view", Value::Null, &pat),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([id]));

    let (status, body) = send(
        &app,
        json_request(Method::GET, "/api/v1/uma/resources?scope=edit", Value::Null, &pat),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    // Another client's PAT cannot touch it.
    let other = client_token(&app, common::APP, "uma_protection").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, body) = send(&app, json_request(Method::DELETE, &uri, Value::Null, &other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access_denied");

    let (status, _) = send(&app, json_request(Method::DELETE, &uri, Value::Null, &pat)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, json_request(Method::GET, &uri, Value::Null, &pat)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uma_grant_over_http() {
    let app = router();
    let pat = pat(&app).await;

    let (_, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/uma/resources",
            json!({ "name": "album", "resource_scopes": ["view", "edit"], "policies": ["needs_email"] }),
            &pat,
        ),
    )
    .await;
    let resource_id = body["_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/uma/permission",
            json!({ "resource_id": "missing", "resource_scopes": ["view"] }),
            &pat,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_resource_id");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/uma/permission",
            json!({ "resource_id": resource_id, "resource_scopes": ["delete"] }),
            &pat,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_scope");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/v1/uma/permission",
            json!([{ "resource_id": resource_id, "resource_scopes": ["view"] }]),
            &pat,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let ticket = body["ticket"].as_str().unwrap().to_string();

    let (client_id, client_secret) = common::APP;
    let grant = |extra: &[(&'static str, String)]| {
        let mut pairs: Vec<(&str, String)> = vec![
            ("grant_type", UMA_TICKET.to_string()),
            ("client_id", client_id.to_string()),
            ("client_secret", client_secret.to_string()),
            ("ticket", ticket.clone()),
        ];
        pairs.extend(extra.iter().cloned());
        let pairs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        post_form("/api/v1/token", &pairs, None)
    };

    let (status, body) = send(&app, grant(&[])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "need_info");
    assert_eq!(body["ticket"], ticket.as_str());
    assert_eq!(body["required_claims"], json!(["email"]));
    let pct = body["pct"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        grant(&[
            ("pct", pct.clone()),
            ("claims", json!({ "email": "bob@example.com" }).to_string()),
            ("scope", "edit".to_string()),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["pct"], pct.as_str());
    assert_eq!(body["upgraded"], false);
    let rpt = body["access_token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, grant(&[("pct", pct.clone())])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_ticket");

    let (status, body) = send(
        &app,
        post_form("/api/v1/uma/rpt/introspect", &[("token", &rpt)], Some(&pat)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["client_id"], "app");
    assert_eq!(body["permissions"][0]["resource_id"], resource_id.as_str());
    // `edit` came from the request's scope parameter, not the ticket.
    assert_eq!(body["permissions"][0]["resource_scopes"], json!(["edit", "view"]));

    let (status, body) = send(
        &app,
        post_form("/api/v1/uma/rpt/introspect", &[("token", "bogus")], Some(&pat)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "active": false }));

    let (status, body) = send(&app, grant(&[("claims", "not json".to_string())])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}
