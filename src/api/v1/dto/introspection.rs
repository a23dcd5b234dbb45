/*
 * Responsibility
 * - POST /uma/rpt/introspect の request/response DTO
 * - inactive な token は {"active": false} だけを返す
 */
use serde::{Deserialize, Serialize};

use crate::services::uma::Rpt;

#[derive(Debug, Deserialize)]
pub struct IntrospectionRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct IntrospectedPermission {
    pub resource_id: String,
    pub resource_scopes: Vec<String>,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<IntrospectedPermission>>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self {
            active: false,
            client_id: None,
            sub: None,
            exp: None,
            iat: None,
            permissions: None,
        }
    }
}

impl From<Rpt> for IntrospectionResponse {
    fn from(rpt: Rpt) -> Self {
        let exp = rpt.expires_at.timestamp();
        Self {
            active: true,
            client_id: Some(rpt.client_id),
            sub: rpt.subject,
            exp: Some(exp),
            iat: Some(rpt.created_at.timestamp()),
            permissions: Some(
                rpt.permissions
                    .into_iter()
                    .map(|(resource_id, scopes)| IntrospectedPermission {
                        resource_id,
                        resource_scopes: scopes.into_iter().collect(),
                        exp,
                    })
                    .collect(),
            ),
        }
    }
}
