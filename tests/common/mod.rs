#![allow(dead_code)]

use std::collections::HashMap;

use uma_server::{app, config::Config, state::AppState};

pub const ISSUER: &str = "https://as.example";
pub const RS: (&str, &str) = ("rs", "rs-secret");
pub const APP: (&str, &str) = ("app", "app-secret");

/// EC + HMAC keys only; RSA generation is too slow for every test.
pub fn config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("AUTH_ISSUER", ISSUER),
        ("OAUTH_CLIENTS", "rs:rs-secret,app:app-secret"),
        ("SIGNING_ALGS", "ES256,HS256"),
        ("ACCESS_TOKEN_SIGNING_ALG", "ES256"),
        ("UMA_REQUIRED_CLAIMS_POLICIES", "needs_email:email"),
    ]);
    Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).expect("test config")
}

pub fn state() -> AppState {
    app::build_state(&config()).expect("state")
}
