use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::services::crypto::SignatureAlgorithm;

/// Policy applied to resources that have no policy attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    Allow,
    Deny,
}

/// Knobs for the UMA services. Built from `Config`; tests build it directly.
#[derive(Debug, Clone)]
pub struct UmaSettings {
    pub ticket_lifetime: Duration,
    /// How long consumed or expired tickets stay around so that late
    /// redemptions get a precise error instead of "unknown ticket".
    pub ticket_retention: Duration,
    pub rpt_lifetime: Duration,
    pub pct_lifetime: Duration,
    pub policy_timeout: StdDuration,
    pub default_policy: DefaultPolicy,
    /// Only the registering client may read, update or delete a resource.
    pub restrict_resource_to_client: bool,
    pub rpt_as_jwt: bool,
    pub pct_as_jwt: bool,
    /// Algorithm for JWT-formatted RPT/PCT codes.
    pub token_algorithm: SignatureAlgorithm,
}

impl Default for UmaSettings {
    fn default() -> Self {
        Self {
            ticket_lifetime: Duration::hours(1),
            ticket_retention: Duration::minutes(10),
            rpt_lifetime: Duration::hours(1),
            pct_lifetime: Duration::days(30),
            policy_timeout: StdDuration::from_secs(2),
            default_policy: DefaultPolicy::Allow,
            restrict_resource_to_client: true,
            rpt_as_jwt: false,
            pct_as_jwt: false,
            token_algorithm: SignatureAlgorithm::RS256,
        }
    }
}

/// chrono -> std duration for store TTLs; negative spans clamp to zero.
pub(crate) fn store_ttl(d: Duration) -> StdDuration {
    d.to_std().unwrap_or(StdDuration::ZERO)
}
