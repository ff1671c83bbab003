use async_trait::async_trait;
use sqlx::{query, query_as, FromRow};
use std::sync::Arc;
use tracing::{error, warn};

#[cfg(feature = "sqlite")]
use sqlx::sqlite::SqlitePoolOptions;
#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "mysql")]
use sqlx::mysql::MySqlPoolOptions;
#[cfg(feature = "mysql")]
use sqlx::MySqlPool;

use crate::config::DatabaseConfig;
use crate::errors::{HeartbeatError, HeartbeatResult};
use crate::server::store::{BotAccount, BotStore, ServerRecord};
use crate::timestamps::{from_optional_datetime, to_datetime_string};

/// Raw `servers` row.
#[derive(Debug, Clone, FromRow)]
struct ServerRow {
    id: String,
    name: Option<String>,
    #[sqlx(rename = "cfxLicense")]
    cfx_license: String,
    #[sqlx(rename = "sv_licenseKeyToken")]
    license_key_token: Option<String>,
}

impl From<ServerRow> for ServerRecord {
    fn from(row: ServerRow) -> Self {
        ServerRecord {
            id: row.id,
            name: row.name,
            cfx_license: row.cfx_license,
            license_key_token: row.license_key_token,
        }
    }
}

/// Raw `stock_accounts` row. Datetime columns arrive as stored text.
#[derive(Debug, Clone, FromRow)]
struct StockAccountRow {
    id: String,
    #[sqlx(rename = "assignedServer")]
    assigned_server: String,
    #[sqlx(rename = "expireOn")]
    expire_on: Option<String>,
    #[sqlx(rename = "entitlementId")]
    entitlement_id: Option<String>,
    #[sqlx(rename = "machineHash")]
    machine_hash: Option<String>,
    #[sqlx(rename = "lastTicketHeartbeat")]
    last_ticket_heartbeat: Option<String>,
    #[sqlx(rename = "lastEntitlementIdHeartbeat")]
    last_entitlement_heartbeat: Option<String>,
    #[sqlx(rename = "lastTicketHeartbeatError")]
    last_ticket_heartbeat_error: Option<String>,
    #[sqlx(rename = "lastEntitlementIdHeartbeatError")]
    last_entitlement_heartbeat_error: Option<String>,
}

impl TryFrom<StockAccountRow> for BotAccount {
    type Error = HeartbeatError;

    fn try_from(row: StockAccountRow) -> HeartbeatResult<Self> {
        Ok(BotAccount {
            expire_on: from_optional_datetime(row.expire_on.as_deref())?,
            last_ticket_heartbeat: from_optional_datetime(row.last_ticket_heartbeat.as_deref())?,
            last_entitlement_heartbeat: from_optional_datetime(
                row.last_entitlement_heartbeat.as_deref(),
            )?,
            id: row.id,
            assigned_server: row.assigned_server,
            entitlement_id: row.entitlement_id,
            machine_hash: row.machine_hash,
            last_ticket_heartbeat_error: row.last_ticket_heartbeat_error,
            last_entitlement_heartbeat_error: row.last_entitlement_heartbeat_error,
        })
    }
}

const SELECT_SERVER: &str =
    "SELECT id, name, cfxLicense, sv_licenseKeyToken FROM servers WHERE cfxLicense = ? LIMIT 1";

#[cfg(feature = "sqlite")]
const SELECT_BOT_SQLITE: &str = r#"
    SELECT id, assignedServer, expireOn, entitlementId, machineHash,
           lastTicketHeartbeat, lastEntitlementIdHeartbeat,
           lastTicketHeartbeatError, lastEntitlementIdHeartbeatError
    FROM stock_accounts
    WHERE id = ? AND assignedServer = ?
    LIMIT 1
"#;

// DATETIME columns are rendered to the same text SQLite stores.
#[cfg(feature = "mysql")]
const SELECT_BOT_MYSQL: &str = r#"
    SELECT id, assignedServer,
           DATE_FORMAT(expireOn, '%Y-%m-%d %H:%i:%s') AS expireOn,
           entitlementId, machineHash,
           DATE_FORMAT(lastTicketHeartbeat, '%Y-%m-%d %H:%i:%s') AS lastTicketHeartbeat,
           DATE_FORMAT(lastEntitlementIdHeartbeat, '%Y-%m-%d %H:%i:%s') AS lastEntitlementIdHeartbeat,
           lastTicketHeartbeatError, lastEntitlementIdHeartbeatError
    FROM stock_accounts
    WHERE id = ? AND assignedServer = ?
    LIMIT 1
"#;

/// Columns this service is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeartbeatColumn {
    LastTicketHeartbeat,
    LastTicketHeartbeatError,
    LastEntitlementHeartbeat,
    LastEntitlementHeartbeatError,
}

impl HeartbeatColumn {
    fn update_sql(self) -> &'static str {
        match self {
            HeartbeatColumn::LastTicketHeartbeat => {
                "UPDATE stock_accounts SET lastTicketHeartbeat = ? WHERE id = ?"
            }
            HeartbeatColumn::LastTicketHeartbeatError => {
                "UPDATE stock_accounts SET lastTicketHeartbeatError = ? WHERE id = ?"
            }
            HeartbeatColumn::LastEntitlementHeartbeat => {
                "UPDATE stock_accounts SET lastEntitlementIdHeartbeat = ? WHERE id = ?"
            }
            HeartbeatColumn::LastEntitlementHeartbeatError => {
                "UPDATE stock_accounts SET lastEntitlementIdHeartbeatError = ? WHERE id = ?"
            }
        }
    }
}

/// Unified database abstraction over SQLite and MySQL.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `mysql` feature enables `Database::MySql`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "mysql")]
    MySql(MySqlPool),
}

impl Database {
    /// Open a connection pool for the configured backend.
    pub async fn connect(config: &DatabaseConfig) -> HeartbeatResult<Arc<Self>> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        HeartbeatError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(HeartbeatError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "mysql")]
            "mysql" => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.mysql_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to MySQL: {e}");
                        HeartbeatError::DatabaseError(format!("failed to connect to MySQL: {e}"))
                    })?;

                Ok(Arc::new(Database::MySql(pool)))
            }
            #[cfg(not(feature = "mysql"))]
            "mysql" => Err(HeartbeatError::ConfigError(
                "MySQL support not compiled in. Enable the 'mysql' feature.".to_string(),
            )),
            other => Err(HeartbeatError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    async fn update_column(
        &self,
        column: HeartbeatColumn,
        value: &str,
        bot_id: &str,
    ) -> HeartbeatResult<()> {
        let sql = column.update_sql();

        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(sql)
                .bind(value)
                .bind(bot_id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite update {column:?} failed: {e}");
                    HeartbeatError::from(e)
                })?
                .rows_affected(),
            #[cfg(feature = "mysql")]
            Database::MySql(pool) => query(sql)
                .bind(value)
                .bind(bot_id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("MySQL update {column:?} failed: {e}");
                    HeartbeatError::from(e)
                })?
                .rows_affected(),
        };

        if rows_affected == 0 {
            warn!(bot_id = %bot_id, ?column, "update matched no stock account");
        }

        Ok(())
    }
}

#[async_trait]
impl BotStore for Database {
    async fn find_server_by_license(
        &self,
        cfx_license: &str,
    ) -> HeartbeatResult<Option<ServerRecord>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, ServerRow>(SELECT_SERVER)
                .bind(cfx_license)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("SQLite find_server_by_license failed: {e}");
                    HeartbeatError::from(e)
                })?,
            #[cfg(feature = "mysql")]
            Database::MySql(pool) => query_as::<_, ServerRow>(SELECT_SERVER)
                .bind(cfx_license)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("MySQL find_server_by_license failed: {e}");
                    HeartbeatError::from(e)
                })?,
        };

        Ok(row.map(ServerRecord::from))
    }

    async fn find_bot(&self, bot_id: &str, server_id: &str) -> HeartbeatResult<Option<BotAccount>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, StockAccountRow>(SELECT_BOT_SQLITE)
                .bind(bot_id)
                .bind(server_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("SQLite find_bot failed: {e}");
                    HeartbeatError::from(e)
                })?,
            #[cfg(feature = "mysql")]
            Database::MySql(pool) => query_as::<_, StockAccountRow>(SELECT_BOT_MYSQL)
                .bind(bot_id)
                .bind(server_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("MySQL find_bot failed: {e}");
                    HeartbeatError::from(e)
                })?,
        };

        row.map(BotAccount::try_from).transpose()
    }

    async fn set_last_ticket_heartbeat(&self, bot_id: &str, at_ms: i64) -> HeartbeatResult<()> {
        let stamp = to_datetime_string(at_ms)?;
        self.update_column(HeartbeatColumn::LastTicketHeartbeat, &stamp, bot_id)
            .await
    }

    async fn set_ticket_heartbeat_error(&self, bot_id: &str, message: &str) -> HeartbeatResult<()> {
        self.update_column(HeartbeatColumn::LastTicketHeartbeatError, message, bot_id)
            .await
    }

    async fn set_last_entitlement_heartbeat(
        &self,
        bot_id: &str,
        at_ms: i64,
    ) -> HeartbeatResult<()> {
        let stamp = to_datetime_string(at_ms)?;
        self.update_column(HeartbeatColumn::LastEntitlementHeartbeat, &stamp, bot_id)
            .await
    }

    async fn set_entitlement_heartbeat_error(
        &self,
        bot_id: &str,
        message: &str,
    ) -> HeartbeatResult<()> {
        self.update_column(
            HeartbeatColumn::LastEntitlementHeartbeatError,
            message,
            bot_id,
        )
        .await
    }

    async fn ping(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("SELECT 1").execute(pool).await.is_ok(),
            #[cfg(feature = "mysql")]
            Database::MySql(pool) => query("SELECT 1").execute(pool).await.is_ok(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "mysql")]
            Database::MySql(_) => "mysql",
        }
    }
}
