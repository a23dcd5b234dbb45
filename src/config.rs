/*
 * Responsibility
 * - 環境変数や設定の読み込み (issuer, client, 署名アルゴリズム, UMA の lifetime など)
 * - 設定値のバリデーション (不足・不正なら起動失敗)
 * - service 向けの設定 struct (KeySettings / UmaSettings) への変換
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::services::clients::ClientSpec;
use crate::services::crypto::SignatureAlgorithm;
use crate::services::keys::KeySettings;
use crate::services::uma::{DefaultPolicy, UmaSettings};

/// Upper bound for every configured lifetime and interval (10 years).
const MAX_SECONDS: u64 = 315_360_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()))
    }

    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A policy that requires a fixed set of claims, as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredClaimsPolicyConfig {
    pub id: String,
    pub claims: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub auth_issuer: String,
    pub clients: Vec<ClientSpec>,

    pub signing_algs: Vec<SignatureAlgorithm>,
    pub access_token_signing_alg: SignatureAlgorithm,
    pub jwks_allowed_algs: Vec<String>,
    pub key_lifetime_seconds: u64,
    pub key_rotation_interval_seconds: Option<u64>,
    pub access_token_ttl_seconds: u64,
    pub access_token_leeway_seconds: u64,

    pub uma_ticket_lifetime_seconds: u64,
    pub uma_rpt_lifetime_seconds: u64,
    pub uma_pct_lifetime_seconds: u64,
    pub uma_policy_timeout_ms: u64,
    pub uma_default_policy: DefaultPolicy,
    pub uma_required_claims_policies: Vec<RequiredClaimsPolicyConfig>,
    pub uma_restrict_resource_to_client: bool,
    pub uma_rpt_as_jwt: bool,
    pub uma_pct_as_jwt: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = get("PORT").and_then(|s| s.parse().ok()).unwrap_or(4000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = get("APP_ENV")
            .map(|v| AppEnv::parse(&v))
            .unwrap_or(AppEnv::Development);

        let auth_issuer = get("AUTH_ISSUER")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("AUTH_ISSUER"))?;

        let clients = parse_clients(
            &get("OAUTH_CLIENTS").ok_or(ConfigError::Missing("OAUTH_CLIENTS"))?,
        )?;

        let signing_algs = parse_algs(
            &get("SIGNING_ALGS").unwrap_or_else(|| "RS256,ES256,HS256".to_string()),
        )?;
        if signing_algs.is_empty() || signing_algs.contains(&SignatureAlgorithm::None) {
            return Err(ConfigError::Invalid("SIGNING_ALGS"));
        }

        let access_token_signing_alg: SignatureAlgorithm = get("ACCESS_TOKEN_SIGNING_ALG")
            .unwrap_or_else(|| "RS256".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("ACCESS_TOKEN_SIGNING_ALG"))?;
        if !signing_algs.contains(&access_token_signing_alg) {
            return Err(ConfigError::Invalid("ACCESS_TOKEN_SIGNING_ALG"));
        }

        let jwks_allowed_algs = split_list(&get("JWKS_ALLOWED_ALGS").unwrap_or_default(), ',');

        let seconds = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                None => Ok(default),
                Some(v) => match v.trim().parse::<u64>() {
                    Ok(n) if n <= MAX_SECONDS => Ok(n),
                    _ => Err(ConfigError::Invalid(key)),
                },
            }
        };
        let flag = |key: &'static str, default: bool| -> Result<bool, ConfigError> {
            match get(key).map(|v| v.trim().to_ascii_lowercase()) {
                None => Ok(default),
                Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => Ok(true),
                Some(v) if matches!(v.as_str(), "false" | "0" | "no") => Ok(false),
                Some(_) => Err(ConfigError::Invalid(key)),
            }
        };

        let key_rotation_interval_seconds = match get("KEY_ROTATION_INTERVAL_SECONDS") {
            None => None,
            Some(v) => match v.trim().parse::<u64>() {
                Ok(n) if (1..=MAX_SECONDS).contains(&n) => Some(n),
                _ => return Err(ConfigError::Invalid("KEY_ROTATION_INTERVAL_SECONDS")),
            },
        };

        let uma_default_policy = match get("UMA_DEFAULT_POLICY")
            .unwrap_or_else(|| "allow".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "allow" => DefaultPolicy::Allow,
            "deny" => DefaultPolicy::Deny,
            _ => return Err(ConfigError::Invalid("UMA_DEFAULT_POLICY")),
        };

        let uma_required_claims_policies =
            parse_required_claims(&get("UMA_REQUIRED_CLAIMS_POLICIES").unwrap_or_default())?;

        Ok(Self {
            addr,
            app_env,
            auth_issuer,
            clients,
            signing_algs,
            access_token_signing_alg,
            jwks_allowed_algs,
            key_lifetime_seconds: seconds("KEY_LIFETIME_SECONDS", 172_800)?,
            key_rotation_interval_seconds,
            access_token_ttl_seconds: seconds("ACCESS_TOKEN_TTL_SECONDS", 3600)?,
            access_token_leeway_seconds: seconds("ACCESS_TOKEN_LEEWAY_SECONDS", 60)?,
            uma_ticket_lifetime_seconds: seconds("UMA_TICKET_LIFETIME_SECONDS", 3600)?,
            uma_rpt_lifetime_seconds: seconds("UMA_RPT_LIFETIME_SECONDS", 3600)?,
            uma_pct_lifetime_seconds: seconds("UMA_PCT_LIFETIME_SECONDS", 2_592_000)?,
            uma_policy_timeout_ms: seconds("UMA_POLICY_TIMEOUT_MS", 2000)?,
            uma_default_policy,
            uma_required_claims_policies,
            uma_restrict_resource_to_client: flag("UMA_RESTRICT_RESOURCE_TO_CLIENT", true)?,
            uma_rpt_as_jwt: flag("UMA_RPT_AS_JWT", false)?,
            uma_pct_as_jwt: flag("UMA_PCT_AS_JWT", false)?,
        })
    }

    pub fn key_settings(&self) -> KeySettings {
        let longest_token = self
            .access_token_ttl_seconds
            .max(self.uma_rpt_lifetime_seconds)
            .max(self.uma_pct_lifetime_seconds);
        KeySettings {
            algorithms: self.signing_algs.clone(),
            jwks_allowed_algs: self.jwks_allowed_algs.clone(),
            key_lifetime: seconds(self.key_lifetime_seconds),
            // A demoted key must outlive everything it signed.
            archive_retention: seconds(longest_token.saturating_add(self.access_token_leeway_seconds)),
        }
    }

    pub fn uma_settings(&self) -> UmaSettings {
        UmaSettings {
            ticket_lifetime: seconds(self.uma_ticket_lifetime_seconds),
            rpt_lifetime: seconds(self.uma_rpt_lifetime_seconds),
            pct_lifetime: seconds(self.uma_pct_lifetime_seconds),
            policy_timeout: StdDuration::from_millis(self.uma_policy_timeout_ms),
            default_policy: self.uma_default_policy,
            restrict_resource_to_client: self.uma_restrict_resource_to_client,
            rpt_as_jwt: self.uma_rpt_as_jwt,
            pct_as_jwt: self.uma_pct_as_jwt,
            token_algorithm: self.access_token_signing_alg,
            ..UmaSettings::default()
        }
    }
}

fn seconds(n: u64) -> Duration {
    Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX / 1000))
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_algs(raw: &str) -> Result<Vec<SignatureAlgorithm>, ConfigError> {
    let mut algs = Vec::new();
    for name in split_list(raw, ',') {
        let alg = name
            .parse::<SignatureAlgorithm>()
            .map_err(|_| ConfigError::Invalid("SIGNING_ALGS"))?;
        if !algs.contains(&alg) {
            algs.push(alg);
        }
    }
    Ok(algs)
}

/// `id:secret[:spontaneous]`, comma separated.
fn parse_clients(raw: &str) -> Result<Vec<ClientSpec>, ConfigError> {
    let mut clients: Vec<ClientSpec> = Vec::new();
    for entry in split_list(raw, ',') {
        let mut parts = entry.splitn(3, ':');
        let (Some(id), Some(secret)) = (parts.next(), parts.next()) else {
            return Err(ConfigError::Invalid("OAUTH_CLIENTS"));
        };
        let spontaneous_scopes = match parts.next() {
            None => false,
            Some("spontaneous") => true,
            Some(_) => return Err(ConfigError::Invalid("OAUTH_CLIENTS")),
        };
        if id.is_empty() || secret.is_empty() || clients.iter().any(|c| c.id == id) {
            return Err(ConfigError::Invalid("OAUTH_CLIENTS"));
        }
        clients.push(ClientSpec {
            id: id.to_string(),
            secret: secret.to_string(),
            spontaneous_scopes,
        });
    }
    if clients.is_empty() {
        return Err(ConfigError::Missing("OAUTH_CLIENTS"));
    }
    Ok(clients)
}

/// `policy:claim|claim;policy:claim`
fn parse_required_claims(raw: &str) -> Result<Vec<RequiredClaimsPolicyConfig>, ConfigError> {
    split_list(raw, ';')
        .into_iter()
        .map(|entry| {
            let (id, claims) = entry
                .split_once(':')
                .ok_or(ConfigError::Invalid("UMA_REQUIRED_CLAIMS_POLICIES"))?;
            let claims = split_list(claims, '|');
            if id.trim().is_empty() || claims.is_empty() {
                return Err(ConfigError::Invalid("UMA_REQUIRED_CLAIMS_POLICIES"));
            }
            Ok(RequiredClaimsPolicyConfig {
                id: id.trim().to_string(),
                claims,
            })
        })
        .collect()
}
