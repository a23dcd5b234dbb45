/*
 * Responsibility
 * - POST /token の request/response DTO (application/x-www-form-urlencoded)
 * - grant_type ごとの必須パラメータのチェック
 */
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,

    // urn:ietf:params:oauth:grant-type:uma-ticket
    pub ticket: Option<String>,
    pub claim_token: Option<String>,
    pub claim_token_format: Option<String>,
    pub pct: Option<String>,
    pub rpt: Option<String>,
    /// JSON object encoded as a string.
    pub claims: Option<String>,
}

impl TokenRequest {
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        for s in self.scope.as_deref().unwrap_or_default().split_whitespace() {
            if !scopes.iter().any(|seen| seen == s) {
                scopes.push(s.to_string());
            }
        }
        scopes
    }

    pub fn ticket(&self) -> Result<&str, &'static str> {
        self.ticket
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or("ticket is required")
    }

    pub fn parsed_claims(&self) -> Result<Option<Map<String, Value>>, &'static str> {
        let Some(raw) = self.claims.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => Err("claims must be a JSON object"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RptResponse {
    /// The RPT.
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub pct: String,
    pub upgraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_split_and_deduplicated() {
        let req = TokenRequest {
            scope: Some(" uma_protection openid  uma_protection ".into()),
            ..Default::default()
        };
        assert_eq!(req.scopes(), vec!["uma_protection", "openid"]);
        assert!(TokenRequest::default().scopes().is_empty());
    }

    #[test]
    fn claims_must_be_an_object() {
        let with = |raw: &str| TokenRequest {
            claims: Some(raw.into()),
            ..Default::default()
        };
        assert_eq!(
            with(r#"{"email":"a@x"}"#).parsed_claims().unwrap().unwrap()["email"],
            "a@x"
        );
        assert!(with("[1,2]").parsed_claims().is_err());
        assert!(with("{oops").parsed_claims().is_err());
        assert!(with("  ").parsed_claims().unwrap().is_none());
    }

    #[test]
    fn ticket_is_required() {
        assert!(TokenRequest::default().ticket().is_err());
        let req = TokenRequest {
            ticket: Some(" t-1 ".into()),
            ..Default::default()
        };
        assert_eq!(req.ticket(), Ok("t-1"));
    }
}
