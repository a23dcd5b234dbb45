/*
 * Responsibility
 * - PolicyEvaluator 契約 (scope 単位で grant / deny + needed claims)
 * - 組み込み policy (allow_all / deny_all / required claims)
 * - PolicyHost: 時間制限付き評価。timeout / error / 未登録 policy は deny 扱い
 * - resource に付いた全 policy が grant した scope だけを許可する
 */
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::uma::{context::AuthorizationContext, settings::DefaultPolicy};

pub const ALLOW_ALL: &str = "allow_all";
pub const DENY_ALL: &str = "deny_all";

/// One scope on one resource, evaluated on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRequest {
    pub resource_id: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDecision {
    pub granted: bool,
    pub needed_claims: Vec<String>,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn grant() -> Self {
        Self {
            granted: true,
            ..Self::default()
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            needed_claims: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    pub fn need_claims(claims: Vec<String>) -> Self {
        Self {
            granted: false,
            reason: Some("claims required".to_string()),
            needed_claims: claims,
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    fn id(&self) -> &str;

    async fn evaluate(
        &self,
        ctx: &AuthorizationContext,
        request: &ScopeRequest,
    ) -> Result<PolicyDecision, PolicyError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PolicyEvaluator for AllowAll {
    fn id(&self) -> &str {
        ALLOW_ALL
    }

    async fn evaluate(
        &self,
        _ctx: &AuthorizationContext,
        _request: &ScopeRequest,
    ) -> Result<PolicyDecision, PolicyError> {
        Ok(PolicyDecision::grant())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl PolicyEvaluator for DenyAll {
    fn id(&self) -> &str {
        DENY_ALL
    }

    async fn evaluate(
        &self,
        _ctx: &AuthorizationContext,
        _request: &ScopeRequest,
    ) -> Result<PolicyDecision, PolicyError> {
        Ok(PolicyDecision::deny("denied by policy"))
    }
}

/// Grants once every listed claim is present in the context.
#[derive(Debug, Clone)]
pub struct RequiredClaimsPolicy {
    id: String,
    claims: Vec<String>,
}

impl RequiredClaimsPolicy {
    pub fn new(id: impl Into<String>, claims: Vec<String>) -> Self {
        Self {
            id: id.into(),
            claims,
        }
    }
}

#[async_trait]
impl PolicyEvaluator for RequiredClaimsPolicy {
    fn id(&self) -> &str {
        &self.id
    }

    async fn evaluate(
        &self,
        ctx: &AuthorizationContext,
        _request: &ScopeRequest,
    ) -> Result<PolicyDecision, PolicyError> {
        let missing: Vec<String> = self
            .claims
            .iter()
            .filter(|c| !ctx.has_claim(c))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(PolicyDecision::grant())
        } else {
            Ok(PolicyDecision::need_claims(missing))
        }
    }
}

/// Outcome over every scope of a ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationDecision {
    /// resource id -> granted scopes
    pub granted: BTreeMap<String, BTreeSet<String>>,
    pub needed_claims: BTreeSet<String>,
    pub deny_reasons: Vec<String>,
}

impl AuthorizationDecision {
    pub fn is_empty(&self) -> bool {
        self.granted.values().all(BTreeSet::is_empty)
    }

    pub fn needs_claims(&self) -> bool {
        !self.needed_claims.is_empty()
    }
}

pub struct PolicyHost {
    policies: HashMap<String, Arc<dyn PolicyEvaluator>>,
    default_policy: DefaultPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for PolicyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.policies.keys().collect();
        ids.sort();
        f.debug_struct("PolicyHost")
            .field("policies", &ids)
            .field("default_policy", &self.default_policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PolicyHost {
    /// Host with the built-in `allow_all` and `deny_all` policies registered.
    pub fn new(default_policy: DefaultPolicy, timeout: Duration) -> Self {
        let mut host = Self {
            policies: HashMap::new(),
            default_policy,
            timeout,
        };
        host.register(Arc::new(AllowAll));
        host.register(Arc::new(DenyAll));
        host
    }

    pub fn register(&mut self, policy: Arc<dyn PolicyEvaluator>) {
        self.policies.insert(policy.id().to_string(), policy);
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.register(policy);
        self
    }

    fn default_policy_id(&self) -> &'static str {
        match self.default_policy {
            DefaultPolicy::Allow => ALLOW_ALL,
            DefaultPolicy::Deny => DENY_ALL,
        }
    }

    /// Run one policy under the time budget. Never grants on failure.
    pub async fn evaluate(
        &self,
        policy_id: &str,
        ctx: &AuthorizationContext,
        request: &ScopeRequest,
    ) -> PolicyDecision {
        let Some(policy) = self.policies.get(policy_id) else {
            warn!(policy_id, "unknown policy attached to resource");
            return PolicyDecision::deny(format!("unknown policy {policy_id}"));
        };

        match tokio::time::timeout(self.timeout, policy.evaluate(ctx, request)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => {
                warn!(policy_id, error = %err, "policy evaluation failed");
                PolicyDecision::deny(format!("policy {policy_id} failed"))
            }
            Err(_) => {
                warn!(policy_id, timeout = ?self.timeout, "policy evaluation timed out");
                PolicyDecision::deny(format!("policy {policy_id} timed out"))
            }
        }
    }

    /// Evaluate every scope of the context's ticket independently.
    ///
    /// A scope is granted only when all policies attached to its resource
    /// grant it; resources without policies use the default policy.
    pub async fn decide(&self, ctx: &AuthorizationContext) -> AuthorizationDecision {
        let mut decision = AuthorizationDecision::default();

        for permission in ctx.permissions() {
            let policy_ids: Vec<String> = match ctx.resource(&permission.resource_id) {
                Some(resource) if !resource.policies.is_empty() => resource.policies.clone(),
                Some(_) => vec![self.default_policy_id().to_string()],
                None => {
                    decision
                        .deny_reasons
                        .push(format!("resource {} is gone", permission.resource_id));
                    continue;
                }
            };

            for scope in &permission.scopes {
                let request = ScopeRequest {
                    resource_id: permission.resource_id.clone(),
                    scope: scope.clone(),
                };

                let mut granted = true;
                for policy_id in &policy_ids {
                    let outcome = self.evaluate(policy_id, ctx, &request).await;
                    if !outcome.granted {
                        granted = false;
                        decision.needed_claims.extend(outcome.needed_claims);
                        if let Some(reason) = outcome.reason {
                            decision.deny_reasons.push(reason);
                        }
                    }
                }

                debug!(
                    resource_id = %request.resource_id,
                    scope = %request.scope,
                    granted,
                    "scope evaluated"
                );
                if granted {
                    decision
                        .granted
                        .entry(request.resource_id)
                        .or_default()
                        .insert(request.scope);
                }
            }
        }

        decision
    }
}
