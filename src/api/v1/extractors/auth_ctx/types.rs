/*
 * Responsibility
 * - Handler から見える「PAT 認証済みコンテキスト」の型
 * - middleware が検証して request extensions に格納し、handler はこの型だけを受け取る
 *
 * Notes
 * - token の署名検証や scope チェックは middleware/services 側の責務
 */

use crate::services::token::VerifiedAccessToken;

/// PAT で認証されたリクエストに付与されるコンテキスト
///
/// - `client_id` は resource server (PAT の発行先 client)
/// - `subject` は resource owner (client_credentials では client 自身)
/// - `jti` は監査/相関用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCtx {
    pub client_id: String,
    pub subject: String,
    pub scopes: Vec<String>,
    pub jti: String,
}

impl From<VerifiedAccessToken> for AuthCtx {
    fn from(token: VerifiedAccessToken) -> Self {
        Self {
            client_id: token.client_id,
            subject: token.subject,
            scopes: token.scopes,
            jti: token.jti,
        }
    }
}
