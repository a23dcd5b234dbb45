/*
 * Responsibility
 * - UMA resource registration の request/response DTO
 * - wire 名 (resource_scopes, type, _id) と domain 型 (ResourceDraft / Resource) の変換
 */
use serde::{Deserialize, Serialize};

use crate::services::uma::{Resource, ResourceDraft};

#[derive(Debug, Deserialize)]
pub struct ResourceRequest {
    pub name: Option<String>,
    pub icon_uri: Option<String>,
    #[serde(default)]
    pub resource_scopes: Vec<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub policies: Vec<String>,
}

impl ResourceRequest {
    pub fn into_draft(self) -> ResourceDraft {
        ResourceDraft {
            name: self.name,
            icon_uri: self.icon_uri,
            scopes: self.resource_scopes,
            description: self.description,
            resource_type: self.resource_type,
            policies: self.policies,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListResourcesQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResourceIdResponse {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    pub resource_scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<String>,
}

impl From<Resource> for ResourceResponse {
    fn from(r: Resource) -> Self {
        Self {
            id: r.id,
            name: r.name,
            icon_uri: r.icon_uri,
            resource_scopes: r.scopes.into_iter().collect(),
            description: r.description,
            resource_type: r.resource_type,
            policies: r.policies,
        }
    }
}
