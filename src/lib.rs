//! OAuth2 authorization server core with the UMA 2.0 profile.
//!
//! Signing and key rotation live in `services::crypto` / `services::keys`,
//! the UMA engine (resources, tickets, policies, RPT, PCT) in `services::uma`.
//! `app` wires them behind an axum router.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod services;
pub mod state;
