//! UMA 2.0 protocol engine: resources, permission tickets, policy decisions,
//! RPT and PCT issuance.

pub mod code;
pub mod context;
pub mod error;
pub mod grant;
pub mod pct;
pub mod permission;
pub mod policy;
pub mod resource;
pub mod rpt;
pub mod settings;

pub use context::{AuthorizationContext, AuthorizationContextBuilder, RequestMetadata};
pub use error::UmaError;
pub use grant::{ClaimTokenVerifier, UmaGrantOutcome, UmaGrantRequest, UmaGrantService};
pub use pct::{ClaimsCollector, Pct};
pub use permission::{PermissionRequest, PermissionTicket, PermissionTicketService};
pub use policy::{
    AuthorizationDecision, PolicyDecision, PolicyEvaluator, PolicyHost, RequiredClaimsPolicy,
};
pub use resource::{Resource, ResourceDraft, ResourceRegistry};
pub use rpt::{IssuedRpt, Rpt, RptIssuer};
pub use settings::{DefaultPolicy, UmaSettings};
