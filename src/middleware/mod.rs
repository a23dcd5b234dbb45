/*
 * Responsibility
 * - middleware の公開インターフェース (re-export)
 * - http (request id / trace / limit / timeout), auth (PAT 検証)
 */
pub mod auth;
pub mod http;
