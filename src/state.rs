/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - ex: keys: KeyRegistry, clients: ClientRegistry, uma: UmaGrantService など
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::{
    clients::ClientRegistry,
    keys::KeyRegistry,
    token::{AccessTokenService, IdTokenFactory},
    uma::{PermissionTicketService, ResourceRegistry, RptIssuer, UmaGrantService},
};

#[derive(Clone, Debug)]
pub struct AppState {
    pub keys: Arc<KeyRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub access_tokens: Arc<AccessTokenService>,
    pub id_tokens: Arc<IdTokenFactory>,
    pub resources: Arc<ResourceRegistry>,
    pub tickets: Arc<PermissionTicketService>,
    pub rpts: Arc<RptIssuer>,
    pub uma: Arc<UmaGrantService>,
}
