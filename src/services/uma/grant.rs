/*
 * Responsibility
 * - UMA grant (urn:ietf:params:oauth:grant-type:uma-ticket) の一連の流れ
 *   ticket redeem -> PCT / claim_token / RPT の検証 -> context 組み立て -> policy 判定
 *   -> PCT 更新 -> (need_info | request_denied | ticket consume + RPT 発行/拡張)
 * - need_info のとき ticket は pending のまま (claims を足して再提出できる)
 * - requesting party (subject) は検証済み claim_token か PCT からのみ決まる
 */
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::services::token::{JwtVerifier, access_token::ACCESS_TOKEN_TYPE};
use crate::services::uma::{
    context::{AuthorizationContextBuilder, RequestMetadata},
    error::UmaError,
    pct::{ClaimsCollector, Pct},
    permission::PermissionTicketService,
    policy::PolicyHost,
    rpt::{Rpt, RptIssuer},
};

pub const UMA_TICKET_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";
pub const ID_TOKEN_CLAIM_TOKEN_FORMAT: &str =
    "http://openid.net/specs/openid-connect-core-1_0.html#IDToken";

// Token mechanics, not claims about the requesting party.
const NON_IDENTITY_CLAIMS: &[&str] = &[
    "iss", "aud", "exp", "iat", "nbf", "jti", "azp", "nonce", "auth_time", "c_hash", "at_hash",
    "s_hash",
];

#[derive(Debug, Clone, Default)]
pub struct UmaGrantRequest {
    pub ticket: String,
    /// Extra scopes asked for on top of the ticket's.
    pub scopes: Vec<String>,
    pub claim_token: Option<String>,
    pub claim_token_format: Option<String>,
    pub pct: Option<String>,
    pub rpt: Option<String>,
    /// Interactively gathered claims. Never sets the subject.
    pub claims: Option<Map<String, Value>>,
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone)]
pub enum UmaGrantOutcome {
    Issued {
        rpt: Rpt,
        pct: Pct,
        upgraded: bool,
    },
    /// More claims are required. The ticket stays redeemable.
    NeedInfo {
        ticket: String,
        pct: String,
        required_claims: Vec<String>,
    },
}

/// Verifies `claim_token`s, which must be ID tokens issued by this server.
#[derive(Debug, Clone)]
pub struct ClaimTokenVerifier {
    verifier: JwtVerifier,
    issuer: String,
}

impl ClaimTokenVerifier {
    pub fn new(verifier: JwtVerifier, issuer: impl Into<String>) -> Self {
        Self {
            verifier,
            issuer: issuer.into(),
        }
    }

    /// Identity claims of the presented token, `None` when there is none.
    pub fn verify(
        &self,
        token: Option<&str>,
        format: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Map<String, Value>>, UmaError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let format = format.map(str::trim).filter(|f| !f.is_empty());

        let token = match (token, format) {
            (None, None) => return Ok(None),
            (None, Some(_)) => return Err(UmaError::InvalidClaimToken),
            (Some(_), f) if f != Some(ID_TOKEN_CLAIM_TOKEN_FORMAT) => {
                return Err(UmaError::InvalidClaimTokenFormat);
            }
            (Some(t), _) => t,
        };

        let signed = self.verifier.verify(token, now).map_err(|err| {
            warn!(error = %err, "claim_token rejected");
            UmaError::InvalidClaimToken
        })?;
        if signed.claim_str("iss") != Some(self.issuer.as_str()) {
            warn!("claim_token from a foreign issuer");
            return Err(UmaError::InvalidClaimToken);
        }
        // Access tokens and RPT/PCT codes are signed by the same keys.
        if signed.header().typ.as_deref() == Some(ACCESS_TOKEN_TYPE)
            || signed.claim_str("sub").is_none()
            || !signed.claims().contains_key("aud")
        {
            warn!("claim_token is not an id token");
            return Err(UmaError::InvalidClaimToken);
        }

        let mut claims = signed.into_claims();
        claims.retain(|name, _| !NON_IDENTITY_CLAIMS.contains(&name.as_str()));
        Ok(Some(claims))
    }
}

#[derive(Debug, Clone)]
pub struct UmaGrantService {
    tickets: Arc<PermissionTicketService>,
    pcts: Arc<ClaimsCollector>,
    rpts: Arc<RptIssuer>,
    policies: Arc<PolicyHost>,
    claim_tokens: ClaimTokenVerifier,
}

impl UmaGrantService {
    pub fn new(
        tickets: Arc<PermissionTicketService>,
        pcts: Arc<ClaimsCollector>,
        rpts: Arc<RptIssuer>,
        policies: Arc<PolicyHost>,
        claim_tokens: ClaimTokenVerifier,
    ) -> Self {
        Self {
            tickets,
            pcts,
            rpts,
            policies,
            claim_tokens,
        }
    }

    pub async fn grant(
        &self,
        client_id: &str,
        req: UmaGrantRequest,
        now: DateTime<Utc>,
    ) -> Result<UmaGrantOutcome, UmaError> {
        let redemption = self.tickets.redeem(&req.ticket, now)?;

        let pct = req
            .pct
            .as_deref()
            .map(|code| self.pcts.get_valid(code, now))
            .transpose()?;
        let existing_rpt = req
            .rpt
            .as_deref()
            .map(|code| self.rpts.find_valid(code, now))
            .transpose()?;
        let token_claims = self
            .claim_tokens
            .verify(
                req.claim_token.as_deref(),
                req.claim_token_format.as_deref(),
                now,
            )?
            .unwrap_or_default();

        let persisted = pct.as_ref().map(Pct::claims).unwrap_or_default();
        let subject = token_claims
            .get("sub")
            .or_else(|| persisted.get("sub"))
            .and_then(Value::as_str)
            .map(str::to_string);

        // Verified claims win over interactive ones.
        let mut fresh = req.claims.unwrap_or_default();
        fresh.remove("sub");
        fresh.extend(token_claims);

        let candidates = self
            .tickets
            .with_requested_scopes(&redemption, client_id, &req.scopes)?;
        let ctx = AuthorizationContextBuilder::new(&candidates, client_id)
            .subject(subject)
            .persisted_claims(persisted)
            .fresh_claims(fresh.clone())
            .metadata(req.metadata)
            .build(now);

        let decision = self.policies.decide(&ctx).await;
        let pct = self
            .pcts
            .merge_claims_into_pct(pct.as_ref(), client_id, &fresh, now)?;

        if decision.needs_claims() {
            let required_claims: Vec<String> = decision.needed_claims.into_iter().collect();
            info!(client_id, required = ?required_claims, "uma grant needs more claims");
            return Ok(UmaGrantOutcome::NeedInfo {
                ticket: redemption.ticket.id.clone(),
                pct: pct.code,
                required_claims,
            });
        }
        if decision.is_empty() {
            info!(client_id, reasons = ?decision.deny_reasons, "uma grant denied");
            return Err(UmaError::RequestDenied);
        }

        // Only the winner of the conditional consume mints.
        let consumed = self.tickets.consume(&redemption, now)?;
        let issued = match self.rpts.mint_or_extend(
            &decision.granted,
            client_id,
            ctx.subject(),
            existing_rpt.as_ref(),
            now,
        ) {
            Ok(issued) => issued,
            Err(err) => {
                error!(client_id, error = %err, "rpt issue failed, releasing ticket");
                if let Err(release_err) = self.tickets.release(&consumed) {
                    error!(client_id, error = %release_err, "permission ticket release failed");
                }
                return Err(err);
            }
        };

        debug!(
            client_id,
            upgraded = issued.upgraded,
            resources = issued.rpt.permissions.len(),
            "uma grant issued rpt"
        );
        Ok(UmaGrantOutcome::Issued {
            rpt: issued.rpt,
            pct,
            upgraded: issued.upgraded,
        })
    }
}
