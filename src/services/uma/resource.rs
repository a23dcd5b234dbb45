/*
 * Responsibility
 * - UMA resource の登録 / 更新 / 取得 / 一覧 / 削除
 * - resource id はサーバ採番で、更新しても変わらない
 * - 登録クライアント以外からの操作制限 (restrict_resource_to_client)
 */
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::repos::{EntityStore, merge};
use crate::services::uma::error::UmaError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    /// Resource owner (subject of the registering PAT).
    pub owner: String,
    /// Client that registered the resource.
    pub client_id: String,
    pub name: String,
    pub icon_uri: Option<String>,
    pub scopes: BTreeSet<String>,
    pub description: Option<String>,
    pub resource_type: Option<String>,
    /// Attached policy ids, all of which must grant a scope.
    pub policies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// Client supplied resource description, for both create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDraft {
    pub name: Option<String>,
    pub icon_uri: Option<String>,
    pub scopes: Vec<String>,
    pub description: Option<String>,
    pub resource_type: Option<String>,
    pub policies: Vec<String>,
}

impl ResourceDraft {
    pub fn validate(&self) -> Result<(), UmaError> {
        if self.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
            return Err(UmaError::InvalidResource("name is required"));
        }
        if let Some(icon) = self.icon_uri.as_deref()
            && Url::parse(icon).is_err()
        {
            return Err(UmaError::InvalidResource("icon_uri must be an absolute URI"));
        }
        if self.scopes.is_empty() {
            return Err(UmaError::InvalidResource("resource_scopes must not be empty"));
        }
        if self.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(UmaError::InvalidResource("resource_scopes contains a blank scope"));
        }
        Ok(())
    }

    fn scope_set(&self) -> BTreeSet<String> {
        self.scopes.iter().map(|s| s.trim().to_string()).collect()
    }

    fn apply(&self, base: &Resource, now: DateTime<Utc>) -> Resource {
        Resource {
            name: self.name.clone().unwrap_or_default().trim().to_string(),
            icon_uri: self.icon_uri.clone(),
            scopes: self.scope_set(),
            description: self.description.clone(),
            resource_type: self.resource_type.clone(),
            policies: self.policies.clone(),
            updated_at: now,
            ..base.clone()
        }
    }
}

#[derive(Clone)]
pub struct ResourceRegistry {
    store: Arc<dyn EntityStore<Resource>>,
    restrict_to_client: bool,
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("restrict_to_client", &self.restrict_to_client)
            .finish()
    }
}

impl ResourceRegistry {
    pub fn new(store: Arc<dyn EntityStore<Resource>>, restrict_to_client: bool) -> Self {
        Self {
            store,
            restrict_to_client,
        }
    }

    pub fn register(
        &self,
        owner: &str,
        client_id: &str,
        draft: ResourceDraft,
        now: DateTime<Utc>,
    ) -> Result<Resource, UmaError> {
        draft.validate()?;

        let base = Resource {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            client_id: client_id.to_string(),
            name: String::new(),
            icon_uri: None,
            scopes: BTreeSet::new(),
            description: None,
            resource_type: None,
            policies: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let resource = draft.apply(&base, now);

        self.store.persist(&resource.id, resource.clone(), None)?;
        info!(resource_id = %resource.id, client_id, scopes = ?resource.scopes, "resource registered");
        Ok(resource)
    }

    /// Replace the description of `id`. Id, owner and registering client are kept.
    pub fn update(
        &self,
        client_id: &str,
        id: &str,
        draft: ResourceDraft,
        now: DateTime<Utc>,
    ) -> Result<Resource, UmaError> {
        draft.validate()?;

        let updated = merge(self.store.as_ref(), id, |current: &Resource| {
            self.check_access(client_id, current)?;
            Ok::<_, UmaError>(draft.apply(current, now))
        })?
        .ok_or_else(|| UmaError::ResourceNotFound(id.to_string()))?;

        debug!(resource_id = id, version = updated.version, "resource updated");
        Ok(updated.value)
    }

    /// Lookup without the client restriction, for ticket and policy processing.
    pub fn find(&self, id: &str) -> Result<Option<Resource>, UmaError> {
        Ok(self.store.find(id)?.map(|v| v.value))
    }

    pub fn get(&self, client_id: &str, id: &str) -> Result<Resource, UmaError> {
        let resource = self
            .find(id)?
            .ok_or_else(|| UmaError::ResourceNotFound(id.to_string()))?;
        self.check_access(client_id, &resource)?;
        Ok(resource)
    }

    /// Resources visible to `client_id`, optionally only those carrying `scope`.
    pub fn list(&self, client_id: &str, scope: Option<&str>) -> Result<Vec<Resource>, UmaError> {
        let mut resources: Vec<Resource> = self
            .store
            .values()?
            .into_iter()
            .map(|v| v.value)
            .filter(|r| !self.restrict_to_client || r.client_id == client_id)
            .filter(|r| scope.is_none_or(|s| r.has_scope(s)))
            .collect();
        resources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(resources)
    }

    pub fn delete(&self, client_id: &str, id: &str) -> Result<(), UmaError> {
        let resource = self.get(client_id, id)?;
        self.store.remove(&resource.id)?;
        info!(resource_id = id, client_id, "resource deleted");
        Ok(())
    }

    fn check_access(&self, client_id: &str, resource: &Resource) -> Result<(), UmaError> {
        if self.restrict_to_client && resource.client_id != client_id {
            warn!(
                resource_id = %resource.id,
                client_id,
                "resource access by a client other than its registrar"
            );
            return Err(UmaError::AccessDenied);
        }
        Ok(())
    }
}
