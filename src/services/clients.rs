//! Statically configured OAuth clients.
//!
//! Only a SHA-256 digest of each secret is kept in memory.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid client credentials")]
    InvalidCredentials,
}

/// Client entry as written in configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSpec {
    pub id: String,
    pub secret: String,
    /// May introduce scopes on a resource that were not registered with it.
    pub spontaneous_scopes: bool,
}

impl std::fmt::Debug for ClientSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSpec")
            .field("id", &self.id)
            .field("spontaneous_scopes", &self.spontaneous_scopes)
            .finish()
    }
}

#[derive(Clone)]
pub struct RegisteredClient {
    id: String,
    secret_hash: [u8; 32],
    spontaneous_scopes: bool,
}

impl std::fmt::Debug for RegisteredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredClient")
            .field("id", &self.id)
            .field("spontaneous_scopes", &self.spontaneous_scopes)
            .finish()
    }
}

impl RegisteredClient {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn allows_spontaneous_scopes(&self) -> bool {
        self.spontaneous_scopes
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, RegisteredClient>,
}

impl ClientRegistry {
    pub fn new(specs: impl IntoIterator<Item = ClientSpec>) -> Self {
        let clients = specs
            .into_iter()
            .map(|spec| {
                let client = RegisteredClient {
                    id: spec.id.clone(),
                    secret_hash: hash_secret(&spec.secret),
                    spontaneous_scopes: spec.spontaneous_scopes,
                };
                (spec.id, client)
            })
            .collect();
        Self { clients }
    }

    pub fn get(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    pub fn authenticate(
        &self,
        client_id: &str,
        secret: &str,
    ) -> Result<&RegisteredClient, ClientError> {
        let presented = hash_secret(secret);
        match self.clients.get(client_id) {
            Some(client) if digests_match(&client.secret_hash, &presented) => Ok(client),
            _ => {
                warn!(client_id, "client authentication failed");
                Err(ClientError::InvalidCredentials)
            }
        }
    }

    /// Whether `client_id` is allowlisted for spontaneous scopes. Unknown
    /// clients are not.
    pub fn allows_spontaneous_scopes(&self, client_id: &str) -> bool {
        self.get(client_id)
            .is_some_and(RegisteredClient::allows_spontaneous_scopes)
    }
}

fn hash_secret(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
