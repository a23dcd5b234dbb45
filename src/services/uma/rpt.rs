/*
 * Responsibility
 * - RPT の発行、または既存 RPT への permission 追加 (同じ client / subject のときのみ)
 * - 追加時は code (token identity) と有効期限を維持する
 * - introspection 用の参照
 */
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::repos::{EntityStore, merge};
use crate::services::uma::{
    code::CodeFactory,
    error::UmaError,
    settings::{UmaSettings, store_ttl},
};

pub type PermissionSet = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rpt {
    pub code: String,
    pub client_id: String,
    /// Requesting party; absent for unauthenticated requesters.
    pub subject: Option<String>,
    /// resource id -> granted scopes
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Rpt {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn belongs_to(&self, client_id: &str, subject: Option<&str>) -> bool {
        self.client_id == client_id && self.subject.as_deref() == subject
    }

    pub fn scopes_for(&self, resource_id: &str) -> Option<&BTreeSet<String>> {
        self.permissions.get(resource_id)
    }
}

/// Result of a mint-or-extend call.
#[derive(Debug, Clone)]
pub struct IssuedRpt {
    pub rpt: Rpt,
    /// `true` when an existing RPT gained permissions instead of a new one
    /// being minted.
    pub upgraded: bool,
}

#[derive(Clone)]
pub struct RptIssuer {
    store: Arc<dyn EntityStore<Rpt>>,
    codes: CodeFactory,
    settings: UmaSettings,
}

impl std::fmt::Debug for RptIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RptIssuer")
            .field("rpt_lifetime", &self.settings.rpt_lifetime)
            .field("rpt_as_jwt", &self.settings.rpt_as_jwt)
            .finish()
    }
}

impl RptIssuer {
    pub fn new(store: Arc<dyn EntityStore<Rpt>>, codes: CodeFactory, settings: UmaSettings) -> Self {
        Self {
            store,
            codes,
            settings,
        }
    }

    /// A presented RPT; blank, unknown or expired codes are `InvalidRpt`.
    pub fn find_valid(&self, code: &str, now: DateTime<Utc>) -> Result<Rpt, UmaError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(UmaError::InvalidRpt);
        }
        match self.store.find(code)? {
            Some(stored) if stored.value.is_valid(now) => Ok(stored.value),
            _ => Err(UmaError::InvalidRpt),
        }
    }

    /// Extend `existing` with `granted` when it is still valid and belongs to
    /// the same client and subject; otherwise mint a new RPT.
    pub fn mint_or_extend(
        &self,
        granted: &PermissionSet,
        client_id: &str,
        subject: Option<&str>,
        existing: Option<&Rpt>,
        now: DateTime<Utc>,
    ) -> Result<IssuedRpt, UmaError> {
        if let Some(existing) = existing.filter(|r| r.is_valid(now) && r.belongs_to(client_id, subject)) {
            let extended = merge(self.store.as_ref(), &existing.code, |current: &Rpt| {
                let mut next = current.clone();
                for (resource_id, scopes) in granted {
                    next.permissions
                        .entry(resource_id.clone())
                        .or_default()
                        .extend(scopes.iter().cloned());
                }
                Ok::<_, UmaError>(next)
            })?;

            if let Some(extended) = extended {
                debug!(client_id, resources = extended.value.permissions.len(), "rpt extended");
                return Ok(IssuedRpt {
                    rpt: extended.value,
                    upgraded: true,
                });
            }
            // Expired out of the store between lookup and merge.
            debug!(client_id, "rpt vanished before extension, minting a new one");
        }

        let expires_at = now + self.settings.rpt_lifetime;
        let rpt = Rpt {
            code: self
                .codes
                .code(self.settings.rpt_as_jwt, client_id, subject, now, expires_at)?,
            client_id: client_id.to_string(),
            subject: subject.map(str::to_string),
            permissions: granted.clone(),
            created_at: now,
            expires_at,
        };
        self.store.persist(
            &rpt.code,
            rpt.clone(),
            Some(store_ttl(self.settings.rpt_lifetime)),
        )?;
        info!(client_id, resources = rpt.permissions.len(), "rpt issued");
        Ok(IssuedRpt {
            rpt,
            upgraded: false,
        })
    }

    /// Active RPT for `code`, if any.
    pub fn introspect(&self, code: &str, now: DateTime<Utc>) -> Result<Option<Rpt>, UmaError> {
        match self.find_valid(code, now) {
            Ok(rpt) => Ok(Some(rpt)),
            Err(UmaError::InvalidRpt) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
