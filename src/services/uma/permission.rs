/*
 * Responsibility
 * - permission ticket の発行 (resource server からの permission 登録)
 * - ticket の redeem (有効性チェック + resource 解決)
 * - ticket の consume: version 条件付き書き込みで 1 回だけ成功させる
 * - RPT 発行に失敗したら consume を取り消す (release)
 */
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::repos::{EntityStore, EvictionHook, Versioned};
use crate::services::clients::ClientRegistry;
use crate::services::crypto::random::random_token;
use crate::services::uma::{
    error::UmaError,
    resource::{Resource, ResourceRegistry},
    settings::{UmaSettings, store_ttl},
};

/// One requested permission: a resource and scopes on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub resource_id: String,
    #[serde(rename = "resource_scopes", default)]
    pub scopes: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Consumed,
}

/// Status as observed at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Pending,
    Consumed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTicket {
    pub id: String,
    /// Resource server that asked for the ticket.
    pub client_id: String,
    pub permissions: Vec<PermissionRequest>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl PermissionTicket {
    pub fn state(&self, now: DateTime<Utc>) -> TicketState {
        match self.status {
            TicketStatus::Consumed => TicketState::Consumed,
            TicketStatus::Pending if now >= self.expires_at => TicketState::Expired,
            TicketStatus::Pending => TicketState::Pending,
        }
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(|p| p.resource_id.as_str())
    }
}

/// A ticket that passed redemption checks, with the version to consume it at.
#[derive(Debug, Clone)]
pub struct TicketRedemption {
    pub ticket: PermissionTicket,
    pub version: u64,
    pub resources: BTreeMap<String, Resource>,
    pub resource_owners: BTreeSet<String>,
}

#[derive(Clone)]
pub struct PermissionTicketService {
    store: Arc<dyn EntityStore<PermissionTicket>>,
    resources: Arc<ResourceRegistry>,
    clients: Arc<ClientRegistry>,
    settings: UmaSettings,
}

impl std::fmt::Debug for PermissionTicketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionTicketService")
            .field("ticket_lifetime", &self.settings.ticket_lifetime)
            .finish()
    }
}

impl PermissionTicketService {
    pub fn new(
        store: Arc<dyn EntityStore<PermissionTicket>>,
        resources: Arc<ResourceRegistry>,
        clients: Arc<ClientRegistry>,
        settings: UmaSettings,
    ) -> Self {
        Self {
            store,
            resources,
            clients,
            settings,
        }
    }

    /// Record a denied or under-scoped access attempt and hand out a ticket for it.
    pub fn request_ticket(
        &self,
        client_id: &str,
        requests: Vec<PermissionRequest>,
        now: DateTime<Utc>,
    ) -> Result<PermissionTicket, UmaError> {
        if requests.is_empty() {
            return Err(UmaError::InvalidRequest("at least one permission is required"));
        }

        // Same resource requested twice collapses into one entry.
        let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for request in requests {
            let resource_id = request.resource_id.trim();
            if resource_id.is_empty() {
                return Err(UmaError::InvalidResourceId(String::new()));
            }
            let resource = self
                .resources
                .find(resource_id)?
                .ok_or_else(|| UmaError::InvalidResourceId(resource_id.to_string()))?;

            if request.scopes.is_empty() {
                return Err(UmaError::InvalidScope(String::new()));
            }
            for scope in &request.scopes {
                if !resource.has_scope(scope) && !self.clients.allows_spontaneous_scopes(client_id) {
                    warn!(resource_id, scope, client_id, "scope not registered on resource");
                    return Err(UmaError::InvalidScope(scope.clone()));
                }
            }
            merged
                .entry(resource.id)
                .or_default()
                .extend(request.scopes);
        }

        let ticket = PermissionTicket {
            id: random_token()?,
            client_id: client_id.to_string(),
            permissions: merged
                .into_iter()
                .map(|(resource_id, scopes)| PermissionRequest {
                    resource_id,
                    scopes,
                })
                .collect(),
            status: TicketStatus::Pending,
            created_at: now,
            expires_at: now + self.settings.ticket_lifetime,
            consumed_at: None,
        };

        let ttl = store_ttl(self.settings.ticket_lifetime + self.settings.ticket_retention);
        self.store.persist(&ticket.id, ticket.clone(), Some(ttl))?;
        info!(client_id, resources = ticket.permissions.len(), "permission ticket issued");
        Ok(ticket)
    }

    /// Check that `ticket_id` may still be redeemed and resolve its resources.
    ///
    /// Nothing is written; a later `consume` makes the redemption final.
    pub fn redeem(&self, ticket_id: &str, now: DateTime<Utc>) -> Result<TicketRedemption, UmaError> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(UmaError::InvalidTicket);
        }
        let Some(stored) = self.store.find(ticket_id)? else {
            debug!("unknown permission ticket");
            return Err(UmaError::InvalidTicket);
        };

        match stored.value.state(now) {
            TicketState::Pending => {}
            TicketState::Consumed => return Err(UmaError::TicketConsumed),
            TicketState::Expired => return Err(UmaError::ExpiredTicket),
        }

        let mut resources = BTreeMap::new();
        let mut resource_owners = BTreeSet::new();
        for resource_id in stored.value.resource_ids() {
            let resource = self
                .resources
                .find(resource_id)?
                .ok_or_else(|| UmaError::InvalidResourceId(resource_id.to_string()))?;
            resource_owners.insert(resource.owner.clone());
            resources.insert(resource.id.clone(), resource);
        }

        Ok(TicketRedemption {
            ticket: stored.value,
            version: stored.version,
            resources,
            resource_owners,
        })
    }

    /// Add client-requested scopes to every redeemed permission.
    ///
    /// A scope joins a resource when the resource registers it or `client_id`
    /// may use spontaneous scopes; anything else is skipped. The stored ticket
    /// is left untouched.
    pub fn with_requested_scopes(
        &self,
        redemption: &TicketRedemption,
        client_id: &str,
        scopes: &[String],
    ) -> Result<TicketRedemption, UmaError> {
        let spontaneous = self.clients.allows_spontaneous_scopes(client_id);
        let mut widened = redemption.clone();

        for permission in &mut widened.ticket.permissions {
            let resource = widened.resources.get(&permission.resource_id);
            for scope in scopes {
                if spontaneous || resource.is_some_and(|r| r.has_scope(scope)) {
                    permission.scopes.insert(scope.clone());
                } else {
                    debug!(client_id, scope, "requested scope not allowed, skipped");
                }
            }
        }

        if widened.ticket.permissions.iter().all(|p| p.scopes.is_empty()) {
            return Err(UmaError::InvalidScope(String::new()));
        }
        Ok(widened)
    }

    /// Mark the redeemed ticket consumed. Only the first caller holding the
    /// redemption's version succeeds.
    pub fn consume(
        &self,
        redemption: &TicketRedemption,
        now: DateTime<Utc>,
    ) -> Result<Versioned<PermissionTicket>, UmaError> {
        let ticket = &redemption.ticket;
        if ticket.state(now) == TicketState::Expired {
            return Err(UmaError::ExpiredTicket);
        }

        let consumed = PermissionTicket {
            status: TicketStatus::Consumed,
            consumed_at: Some(now),
            ..ticket.clone()
        };
        match self
            .store
            .replace_if_version(&ticket.id, redemption.version, consumed)?
        {
            Some(written) => {
                debug!(client_id = %ticket.client_id, "permission ticket consumed");
                Ok(written)
            }
            None => {
                warn!("permission ticket redeemed concurrently");
                match self.store.find(&ticket.id)? {
                    None => Err(UmaError::InvalidTicket),
                    Some(_) => Err(UmaError::TicketConsumed),
                }
            }
        }
    }

    /// Put a consumed ticket back to pending, as long as nothing else wrote
    /// it since `consumed`.
    pub fn release(&self, consumed: &Versioned<PermissionTicket>) -> Result<bool, UmaError> {
        let pending = PermissionTicket {
            status: TicketStatus::Pending,
            consumed_at: None,
            ..consumed.value.clone()
        };
        let released = self
            .store
            .replace_if_version(&consumed.value.id, consumed.version, pending)?
            .is_some();
        if released {
            info!(client_id = %consumed.value.client_id, "permission ticket released");
        } else {
            warn!(client_id = %consumed.value.client_id, "permission ticket changed before release");
        }
        Ok(released)
    }
}

/// Logs tickets that left the store without ever being redeemed.
pub fn ticket_eviction_hook() -> EvictionHook<PermissionTicket> {
    Arc::new(|_key, ticket, cause| {
        if ticket.status == TicketStatus::Pending {
            debug!(client_id = %ticket.client_id, ?cause, "permission ticket dropped unredeemed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::MemoryStore;
    use crate::services::clients::ClientSpec;
    use crate::services::uma::resource::ResourceDraft;
    use chrono::Duration;

    struct Fixture {
        tickets: PermissionTicketService,
        resource: Resource,
    }

    fn fixture() -> Fixture {
        let resources = Arc::new(ResourceRegistry::new(Arc::new(MemoryStore::new("r")), true));
        let resource = resources
            .register(
                "alice",
                "rs",
                ResourceDraft {
                    name: Some("album".into()),
                    scopes: vec!["view".into(), "edit".into()],
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        let clients = Arc::new(ClientRegistry::new([
            ClientSpec {
                id: "rs".into(),
                secret: "x".into(),
                spontaneous_scopes: false,
            },
            ClientSpec {
                id: "open-rs".into(),
                secret: "x".into(),
                spontaneous_scopes: true,
            },
        ]));
        let tickets = PermissionTicketService::new(
            Arc::new(MemoryStore::new("t")),
            resources,
            clients,
            UmaSettings::default(),
        );
        Fixture { tickets, resource }
    }

    fn request(resource_id: &str, scopes: &[&str]) -> PermissionRequest {
        PermissionRequest {
            resource_id: resource_id.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn ticket_is_redeemable_until_consumed() {
        let f = fixture();
        let now = Utc::now();
        let ticket = f
            .tickets
            .request_ticket("rs", vec![request(&f.resource.id, &["view"])], now)
            .unwrap();

        let first = f.tickets.redeem(&ticket.id, now).unwrap();
        assert_eq!(first.resource_owners, BTreeSet::from(["alice".to_string()]));
        // Redeeming without consuming is repeatable.
        let second = f.tickets.redeem(&ticket.id, now).unwrap();

        f.tickets.consume(&first, now).unwrap();
        assert!(matches!(f.tickets.consume(&second, now), Err(UmaError::TicketConsumed)));
        assert!(matches!(f.tickets.redeem(&ticket.id, now), Err(UmaError::TicketConsumed)));
    }

    #[test]
    fn released_ticket_is_redeemable_again() {
        let f = fixture();
        let now = Utc::now();
        let ticket = f
            .tickets
            .request_ticket("rs", vec![request(&f.resource.id, &["view"])], now)
            .unwrap();

        let redemption = f.tickets.redeem(&ticket.id, now).unwrap();
        let consumed = f.tickets.consume(&redemption, now).unwrap();
        assert_eq!(consumed.value.status, TicketStatus::Consumed);

        assert!(f.tickets.release(&consumed).unwrap());
        let again = f.tickets.redeem(&ticket.id, now).unwrap();
        assert_eq!(again.ticket.consumed_at, None);
        // A stale consume version cannot release the newer write.
        assert!(!f.tickets.release(&consumed).unwrap());
        f.tickets.consume(&again, now).unwrap();
    }

    #[test]
    fn requested_scopes_join_only_where_allowed() {
        let f = fixture();
        let now = Utc::now();
        let ticket = f
            .tickets
            .request_ticket("rs", vec![request(&f.resource.id, &["view"])], now)
            .unwrap();
        let redemption = f.tickets.redeem(&ticket.id, now).unwrap();
        let asked = vec!["edit".to_string(), "share".to_string()];

        let widened = f.tickets.with_requested_scopes(&redemption, "rs", &asked).unwrap();
        assert_eq!(
            widened.ticket.permissions[0].scopes,
            BTreeSet::from(["view".to_string(), "edit".to_string()])
        );

        let spontaneous = f
            .tickets
            .with_requested_scopes(&redemption, "open-rs", &asked)
            .unwrap();
        assert!(spontaneous.ticket.permissions[0].scopes.contains("share"));

        // The stored ticket keeps what the resource server asked for.
        let stored = f.tickets.redeem(&ticket.id, now).unwrap();
        assert_eq!(stored.ticket.permissions[0].scopes.len(), 1);
    }

    #[test]
    fn empty_candidate_scopes_are_invalid() {
        let f = fixture();
        let now = Utc::now();
        let ticket = f
            .tickets
            .request_ticket("rs", vec![request(&f.resource.id, &["view"])], now)
            .unwrap();
        let mut redemption = f.tickets.redeem(&ticket.id, now).unwrap();
        redemption.ticket.permissions[0].scopes.clear();

        assert!(matches!(
            f.tickets.with_requested_scopes(&redemption, "rs", &["nope".to_string()]),
            Err(UmaError::InvalidScope(_))
        ));
    }

    #[test]
    fn expired_ticket_cannot_be_redeemed() {
        let f = fixture();
        let now = Utc::now();
        let ticket = f
            .tickets
            .request_ticket("rs", vec![request(&f.resource.id, &["view"])], now)
            .unwrap();
        let later = now + Duration::hours(2);
        assert!(matches!(f.tickets.redeem(&ticket.id, later), Err(UmaError::ExpiredTicket)));

        let redemption = f.tickets.redeem(&ticket.id, now).unwrap();
        assert!(matches!(f.tickets.consume(&redemption, later), Err(UmaError::ExpiredTicket)));
    }

    #[test]
    fn unknown_or_blank_ticket_is_invalid() {
        let f = fixture();
        assert!(matches!(f.tickets.redeem("", Utc::now()), Err(UmaError::InvalidTicket)));
        assert!(matches!(f.tickets.redeem("nope", Utc::now()), Err(UmaError::InvalidTicket)));
    }

    #[test]
    fn request_validation() {
        let f = fixture();
        let now = Utc::now();
        assert!(matches!(
            f.tickets.request_ticket("rs", vec![request("missing", &["view"])], now),
            Err(UmaError::InvalidResourceId(_))
        ));
        assert!(matches!(
            f.tickets.request_ticket("rs", vec![request(&f.resource.id, &["delete"])], now),
            Err(UmaError::InvalidScope(s)) if s == "delete"
        ));
        assert!(matches!(
            f.tickets.request_ticket("rs", vec![request(&f.resource.id, &[])], now),
            Err(UmaError::InvalidScope(_))
        ));
        assert!(f.tickets.request_ticket("rs", vec![], now).is_err());
    }

    #[test]
    fn spontaneous_scopes_for_allowlisted_clients() {
        let f = fixture();
        let ticket = f
            .tickets
            .request_ticket("open-rs", vec![request(&f.resource.id, &["share"])], Utc::now())
            .unwrap();
        assert!(ticket.permissions[0].scopes.contains("share"));
    }

    #[test]
    fn duplicate_resources_are_merged() {
        let f = fixture();
        let ticket = f
            .tickets
            .request_ticket(
                "rs",
                vec![
                    request(&f.resource.id, &["view"]),
                    request(&f.resource.id, &["edit"]),
                ],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(ticket.permissions.len(), 1);
        assert_eq!(ticket.permissions[0].scopes.len(), 2);
    }
}
