/*
 * Responsibility
 * - Config読み込み → 依存生成 (鍵 / client / token / UMA service) → Router 組み立て
 * - Middleware の適用 (request id / trace / limit / timeout, PAT)
 * - 鍵 rotation の定期実行 (設定時のみ)
 * - axum::serve() で起動
 */
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};

use anyhow::Result;
use axum::{Router, routing::get};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{
    self,
    v1::handlers::{
        health::health,
        jwks::{archived_key, jwks},
    },
};
use crate::config::Config;
use crate::error::AppError;
use crate::middleware;
use crate::repos::MemoryStore;
use crate::services::{
    clients::ClientRegistry,
    keys::KeyRegistry,
    token::{AccessTokenService, IdTokenFactory, JwtSigner, JwtVerifier},
    uma::{
        ClaimTokenVerifier, ClaimsCollector, PermissionTicketService, PolicyHost,
        RequiredClaimsPolicy, ResourceRegistry, RptIssuer, UmaGrantService, code::CodeFactory,
        permission::ticket_eviction_hook,
    },
};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,uma_server=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let abort_on_panic = !config.app_env.is_production();
    init_panic_hook(abort_on_panic);

    tracing::info!(
        "starting authorization server in {:?} mode on {} (issuer {})",
        config.app_env,
        config.addr,
        config.auth_issuer
    );

    let state = build_state(&config)?;
    let rotation = config
        .key_rotation_interval_seconds
        .map(|secs| spawn_key_rotation(state.keys.clone(), Duration::from_secs(secs)));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(rotation) = rotation {
        rotation.abort();
    }
    Ok(())
}

/// Build process-level services and inject them into the shared application state.
pub fn build_state(config: &Config) -> Result<AppState, AppError> {
    let keys = Arc::new(KeyRegistry::bootstrap(config.key_settings(), Utc::now())?);
    let signer = JwtSigner::new(keys.clone());
    let leeway = i64::try_from(config.access_token_leeway_seconds).unwrap_or(i64::MAX);
    let verifier = JwtVerifier::new(keys.clone(), leeway);
    let settings = config.uma_settings();

    let clients = Arc::new(ClientRegistry::new(config.clients.clone()));
    let access_tokens = Arc::new(AccessTokenService::new(
        signer.clone(),
        verifier.clone(),
        config.auth_issuer.clone(),
        config.access_token_signing_alg,
        config.access_token_ttl_seconds,
    ));
    let id_tokens = Arc::new(IdTokenFactory::new(
        signer.clone(),
        config.auth_issuer.clone(),
        config.access_token_signing_alg,
        config.access_token_ttl_seconds,
    ));

    let resources = Arc::new(ResourceRegistry::new(
        Arc::new(MemoryStore::new("uma_resources")),
        settings.restrict_resource_to_client,
    ));
    let tickets = Arc::new(PermissionTicketService::new(
        Arc::new(MemoryStore::with_eviction_hook(
            "uma_tickets",
            Some(ticket_eviction_hook()),
        )),
        resources.clone(),
        clients.clone(),
        settings.clone(),
    ));
    let codes = CodeFactory::new(signer, settings.token_algorithm);
    let pcts = Arc::new(ClaimsCollector::new(
        Arc::new(MemoryStore::new("uma_pcts")),
        codes.clone(),
        settings.clone(),
    ));
    let rpts = Arc::new(RptIssuer::new(
        Arc::new(MemoryStore::new("uma_rpts")),
        codes,
        settings.clone(),
    ));

    let policies = config.uma_required_claims_policies.iter().fold(
        PolicyHost::new(settings.default_policy, settings.policy_timeout),
        |host, p| host.with_policy(Arc::new(RequiredClaimsPolicy::new(p.id.clone(), p.claims.clone()))),
    );

    let uma = Arc::new(UmaGrantService::new(
        tickets.clone(),
        pcts,
        rpts.clone(),
        Arc::new(policies),
        ClaimTokenVerifier::new(verifier, config.auth_issuer.clone()),
    ));

    Ok(AppState {
        keys,
        clients,
        access_tokens,
        id_tokens,
        resources,
        tickets,
        rpts,
        uma,
    })
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/jwks", get(jwks))
        .route("/jwks/archived", get(archived_key))
        .nest("/api/v1", api::v1::routes(state.clone()))
        .with_state(state);

    middleware::http::apply(router)
}

/// Rotate every signing key each `every`, then drop archived keys past their retention.
pub fn spawn_key_rotation(keys: Arc<KeyRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;

            // Key generation (RSA) is CPU bound.
            let registry = keys.clone();
            match tokio::task::spawn_blocking(move || registry.rotate_all(Utc::now())).await {
                Ok(Ok(kids)) => tracing::info!(?kids, "signing keys rotated"),
                Ok(Err(err)) => tracing::error!(error = %err, "signing key rotation failed"),
                Err(err) => tracing::error!(error = %err, "signing key rotation task failed"),
            }

            let pruned = keys.prune_archived(Utc::now());
            if pruned > 0 {
                tracing::info!(pruned, "archived signing keys pruned");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
