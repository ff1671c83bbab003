//! Storage seam for the heartbeat flow.
//!
//! The handler only ever talks to a [`BotStore`]. The production
//! implementation is [`crate::server::database::Database`]; tests plug in
//! their own.

use async_trait::async_trait;

use crate::errors::HeartbeatResult;

/// A game server, resolved by its Cfx.re license key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub id: String,
    pub name: Option<String>,
    pub cfx_license: String,
    /// `sv_licenseKeyToken`, forwarded to the ticket endpoint.
    pub license_key_token: Option<String>,
}

impl ServerRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A stock account ("bot") assigned to a server.
///
/// All instants are epoch milliseconds (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BotAccount {
    pub id: String,
    pub assigned_server: String,
    pub expire_on: Option<i64>,
    pub entitlement_id: Option<String>,
    pub machine_hash: Option<String>,
    pub last_ticket_heartbeat: Option<i64>,
    pub last_entitlement_heartbeat: Option<i64>,
    pub last_ticket_heartbeat_error: Option<String>,
    pub last_entitlement_heartbeat_error: Option<String>,
}

impl BotAccount {
    /// A bot is actionable until its expiration instant; no expiration means forever.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expire_on.is_some_and(|expire_on| expire_on < now_ms)
    }
}

#[async_trait]
pub trait BotStore: Send + Sync {
    /// Look up a server by its (already trimmed) license key.
    async fn find_server_by_license(&self, cfx_license: &str)
        -> HeartbeatResult<Option<ServerRecord>>;

    /// Look up a bot, scoped to the server it is assigned to.
    async fn find_bot(&self, bot_id: &str, server_id: &str) -> HeartbeatResult<Option<BotAccount>>;

    async fn set_last_ticket_heartbeat(&self, bot_id: &str, at_ms: i64) -> HeartbeatResult<()>;

    async fn set_ticket_heartbeat_error(&self, bot_id: &str, message: &str) -> HeartbeatResult<()>;

    async fn set_last_entitlement_heartbeat(&self, bot_id: &str, at_ms: i64)
        -> HeartbeatResult<()>;

    async fn set_entitlement_heartbeat_error(
        &self,
        bot_id: &str,
        message: &str,
    ) -> HeartbeatResult<()>;

    /// Cheap connectivity probe for `/health`.
    async fn ping(&self) -> bool;

    /// Backend label reported by `/health`.
    fn backend_name(&self) -> &'static str;
}
