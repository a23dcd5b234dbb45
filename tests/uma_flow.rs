mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{Map, Value, json};
use uma_server::services::token::IdTokenRequest;
use uma_server::services::uma::{
    PermissionRequest, ResourceDraft, UmaError, UmaGrantOutcome, UmaGrantRequest,
    grant::ID_TOKEN_CLAIM_TOKEN_FORMAT,
};
use uma_server::state::AppState;

fn register(state: &AppState, scopes: &[&str], policies: &[&str]) -> String {
    state
        .resources
        .register(
            "alice",
            "rs",
            ResourceDraft {
                name: Some("photo album".into()),
                icon_uri: Some("https://rs.example/album.png".into()),
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                policies: policies.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap()
        .id
}

fn ticket(state: &AppState, resource_id: &str, scopes: &[&str]) -> String {
    state
        .tickets
        .request_ticket(
            "rs",
            vec![PermissionRequest {
                resource_id: resource_id.to_string(),
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
            }],
            Utc::now(),
        )
        .unwrap()
        .id
}

fn claims(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn claims_gathering_then_rpt_extension() {
    let state = common::state();
    let resource = register(&state, &["view", "edit"], &["needs_email"]);

    // 1. without claims: need_info, ticket stays redeemable
    let view_ticket = ticket(&state, &resource, &["view"]);
    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: view_ticket.clone(),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let (returned_ticket, pct, required_claims) = match outcome {
        UmaGrantOutcome::NeedInfo {
            ticket,
            pct,
            required_claims,
        } => (ticket, pct, required_claims),
        other => panic!("expected need_info, got {other:?}"),
    };
    assert_eq!(returned_ticket, view_ticket);
    assert_eq!(required_claims, vec!["email".to_string()]);

    // 2. same ticket with the missing claim: rpt with view
    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: view_ticket.clone(),
                pct: Some(pct.clone()),
                claims: Some(claims(json!({ "email": "bob@example.com" }))),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let (rpt, issued_pct, upgraded) = match outcome {
        UmaGrantOutcome::Issued { rpt, pct, upgraded } => (rpt, pct, upgraded),
        other => panic!("expected rpt, got {other:?}"),
    };
    assert!(!upgraded);
    assert_eq!(issued_pct.code, pct);
    assert_eq!(rpt.scopes_for(&resource), Some(&set(&["view"])));

    // 3. the ticket is spent
    let replay = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: view_ticket,
                pct: Some(pct.clone()),
                ..Default::default()
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(replay, Err(UmaError::TicketConsumed)));

    // 4. second ticket for edit, email comes from the pct alone
    let edit_ticket = ticket(&state, &resource, &["edit"]);
    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: edit_ticket,
                pct: Some(pct),
                rpt: Some(rpt.code.clone()),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let (extended, upgraded) = match outcome {
        UmaGrantOutcome::Issued { rpt, upgraded, .. } => (rpt, upgraded),
        other => panic!("expected rpt, got {other:?}"),
    };
    assert!(upgraded);
    assert_eq!(extended.code, rpt.code);
    assert_eq!(extended.scopes_for(&resource), Some(&set(&["view", "edit"])));

    let introspected = state.rpts.introspect(&rpt.code, Utc::now()).unwrap().unwrap();
    assert_eq!(introspected.permissions, extended.permissions);
}

#[tokio::test]
async fn id_token_claim_token_supplies_subject_and_claims() {
    let state = common::state();
    let resource = register(&state, &["view"], &["needs_email"]);
    let ticket = ticket(&state, &resource, &["view"]);

    let id_token = state
        .id_tokens
        .create(
            IdTokenRequest {
                subject: "carol",
                audience: "app",
                extra: claims(json!({ "email": "carol@example.com" })),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket,
                claim_token: Some(id_token),
                claim_token_format: Some(ID_TOKEN_CLAIM_TOKEN_FORMAT.into()),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let (rpt, pct) = match outcome {
        UmaGrantOutcome::Issued { rpt, pct, .. } => (rpt, pct),
        other => panic!("expected rpt, got {other:?}"),
    };
    assert_eq!(rpt.subject.as_deref(), Some("carol"));
    assert_eq!(pct.claims()["email"], "carol@example.com");
}

#[tokio::test]
async fn deny_all_policy_denies_request() {
    let state = common::state();
    let resource = register(&state, &["view"], &["deny_all"]);
    let ticket = ticket(&state, &resource, &["view"]);

    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: ticket.clone(),
                ..Default::default()
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(outcome, Err(UmaError::RequestDenied)));

    // A denial does not spend the ticket.
    assert!(state.tickets.redeem(&ticket, Utc::now()).is_ok());
}

#[tokio::test]
async fn expired_ticket_is_rejected() {
    let state = common::state();
    let resource = register(&state, &["view"], &[]);
    let ticket = ticket(&state, &resource, &["view"]);

    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket,
                ..Default::default()
            },
            Utc::now() + Duration::hours(2),
        )
        .await;
    assert!(matches!(outcome, Err(UmaError::ExpiredTicket)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_mint_once() {
    let state = common::state();
    let resource = register(&state, &["view"], &[]);
    let ticket = ticket(&state, &resource, &["view"]);

    let uma = state.uma.clone();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let uma = Arc::clone(&uma);
            let ticket = ticket.clone();
            tokio::spawn(async move {
                uma.grant(
                    "app",
                    UmaGrantRequest {
                        ticket,
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .await
            })
        })
        .collect();

    let mut issued = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(UmaGrantOutcome::Issued { .. }) => issued += 1,
            Err(UmaError::TicketConsumed) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(issued, 1);
}

#[tokio::test]
async fn unknown_pct_or_rpt_is_rejected() {
    let state = common::state();
    let resource = register(&state, &["view"], &[]);
    let ticket = ticket(&state, &resource, &["view"]);

    let bad_pct = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: ticket.clone(),
                pct: Some("nope".into()),
                ..Default::default()
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(bad_pct, Err(UmaError::InvalidPct)));

    let bad_rpt = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket,
                rpt: Some("nope".into()),
                ..Default::default()
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(bad_rpt, Err(UmaError::InvalidRpt)));
}

#[tokio::test]
async fn interactive_claims_cannot_override_the_verified_subject() {
    let state = common::state();
    let resource = register(&state, &["view", "edit"], &["needs_email"]);

    let id_token = state
        .id_tokens
        .create(
            IdTokenRequest {
                subject: "carol",
                audience: "app",
                extra: claims(json!({ "email": "carol@example.com" })),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: ticket(&state, &resource, &["view"]),
                claim_token: Some(id_token),
                claim_token_format: Some(ID_TOKEN_CLAIM_TOKEN_FORMAT.into()),
                claims: Some(claims(json!({ "sub": "alice", "email": "alice@example.com" }))),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let (rpt, pct) = match outcome {
        UmaGrantOutcome::Issued { rpt, pct, .. } => (rpt, pct),
        other => panic!("expected rpt, got {other:?}"),
    };
    assert_eq!(rpt.subject.as_deref(), Some("carol"));
    assert_eq!(pct.claims()["sub"], "carol");
    assert_eq!(pct.claims()["email"], "carol@example.com");

    // Without a claim token the subject stays the one the pct recorded.
    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: ticket(&state, &resource, &["edit"]),
                pct: Some(pct.code),
                claims: Some(claims(json!({ "sub": "alice" }))),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    match outcome {
        UmaGrantOutcome::Issued { rpt, .. } => assert_eq!(rpt.subject.as_deref(), Some("carol")),
        other => panic!("expected rpt, got {other:?}"),
    }

    // And a bare `sub` claim names nobody.
    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: ticket(&state, &resource, &["view"]),
                claims: Some(claims(json!({ "sub": "alice", "email": "mallory@example.com" }))),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    match outcome {
        UmaGrantOutcome::Issued { rpt, .. } => assert_eq!(rpt.subject, None),
        other => panic!("expected rpt, got {other:?}"),
    }
}

#[tokio::test]
async fn requested_scopes_widen_the_ticket() {
    let state = common::state();
    let resource = register(&state, &["view", "edit"], &[]);

    let outcome = state
        .uma
        .grant(
            "app",
            UmaGrantRequest {
                ticket: ticket(&state, &resource, &["view"]),
                scopes: vec!["edit".into(), "admin".into()],
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let rpt = match outcome {
        UmaGrantOutcome::Issued { rpt, .. } => rpt,
        other => panic!("expected rpt, got {other:?}"),
    };
    // `admin` is not registered and `app` has no spontaneous scopes.
    assert_eq!(rpt.scopes_for(&resource), Some(&set(&["view", "edit"])));
}
