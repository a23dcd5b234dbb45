//! Input handed to policies. Built once per redemption attempt and never
//! modified afterwards.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::services::uma::{
    permission::{PermissionRequest, TicketRedemption},
    resource::Resource,
};

/// Transport details of the request that triggered evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub request_id: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    ticket_id: String,
    client_id: String,
    subject: Option<String>,
    permissions: Vec<PermissionRequest>,
    resources: BTreeMap<String, Resource>,
    resource_owners: BTreeSet<String>,
    claims: Map<String, Value>,
    metadata: RequestMetadata,
    evaluated_at: DateTime<Utc>,
}

impl AuthorizationContext {
    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn permissions(&self) -> &[PermissionRequest] {
        &self.permissions
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resource_owners(&self) -> &BTreeSet<String> {
        &self.resource_owners
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name).filter(|v| !v.is_null())
    }

    pub fn has_claim(&self, name: &str) -> bool {
        self.claim(name).is_some()
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }
}

/// Claims are layered in call order: persisted (PCT) claims first, then each
/// batch of fresh claims. A later layer overwrites an earlier one.
#[derive(Debug)]
pub struct AuthorizationContextBuilder<'a> {
    redemption: &'a TicketRedemption,
    client_id: String,
    subject: Option<String>,
    claims: Map<String, Value>,
    metadata: RequestMetadata,
}

impl<'a> AuthorizationContextBuilder<'a> {
    pub fn new(redemption: &'a TicketRedemption, client_id: impl Into<String>) -> Self {
        Self {
            redemption,
            client_id: client_id.into(),
            subject: None,
            claims: Map::new(),
            metadata: RequestMetadata::default(),
        }
    }

    pub fn subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn persisted_claims(self, claims: Map<String, Value>) -> Self {
        self.claims(claims)
    }

    pub fn fresh_claims(self, claims: Map<String, Value>) -> Self {
        self.claims(claims)
    }

    fn claims(mut self, claims: Map<String, Value>) -> Self {
        self.claims.extend(claims);
        self
    }

    pub fn metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The subject is only what `subject` set; a `sub` claim never implies one.
    pub fn build(self, now: DateTime<Utc>) -> AuthorizationContext {
        AuthorizationContext {
            ticket_id: self.redemption.ticket.id.clone(),
            client_id: self.client_id,
            subject: self.subject,
            permissions: self.redemption.ticket.permissions.clone(),
            resources: self.redemption.resources.clone(),
            resource_owners: self.redemption.resource_owners.clone(),
            claims: self.claims,
            metadata: self.metadata,
            evaluated_at: now,
        }
    }
}
