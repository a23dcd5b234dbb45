/*
 * Responsibility
 * - policy 判定に渡す request metadata (request id / remote addr / user agent) の抽出
 * - 取れない項目は None のまま (拒否はしない)
 */
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, header, request::Parts};

use crate::middleware::http::REQUEST_ID_HEADER;
use crate::services::uma::RequestMetadata;

pub struct RequestMeta(pub RequestMetadata);

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote_addr = forwarded_for(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(RequestMeta(RequestMetadata {
            request_id: header_str(&parts.headers, REQUEST_ID_HEADER),
            remote_addr,
            user_agent: header_str(&parts.headers, header::USER_AGENT.as_str()),
        }))
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")?
        .split(',')
        .next()
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn reads_headers() {
        let req = Request::builder()
            .header(REQUEST_ID_HEADER, "req-1")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header(header::USER_AGENT, "rs/1.0")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        let RequestMeta(meta) = RequestMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta.request_id.as_deref(), Some("req-1"));
        assert_eq!(meta.remote_addr.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("rs/1.0"));
    }

    #[tokio::test]
    async fn missing_headers_stay_empty() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let RequestMeta(meta) = RequestMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta, RequestMetadata::default());
    }
}
