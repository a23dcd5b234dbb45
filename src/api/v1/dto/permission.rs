/*
 * Responsibility
 * - POST /uma/permission の request/response DTO
 * - 単体 object と配列の両方を受け付ける
 */
use serde::{Deserialize, Serialize};

use crate::services::uma::PermissionRequest;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PermissionBody {
    Many(Vec<PermissionRequest>),
    One(PermissionRequest),
}

impl PermissionBody {
    pub fn into_requests(self) -> Vec<PermissionRequest> {
        match self {
            PermissionBody::Many(requests) => requests,
            PermissionBody::One(request) => vec![request],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_single_and_list() {
        let one: PermissionBody =
            serde_json::from_value(json!({ "resource_id": "r", "resource_scopes": ["view"] }))
                .unwrap();
        assert_eq!(one.into_requests().len(), 1);

        let many: PermissionBody = serde_json::from_value(json!([
            { "resource_id": "r", "resource_scopes": ["view"] },
            { "resource_id": "s", "resource_scopes": ["edit"] }
        ]))
        .unwrap();
        let requests = many.into_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].scopes.contains("edit"));
    }
}
