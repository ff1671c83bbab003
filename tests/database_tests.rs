use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio_test::assert_ok;

use heartbeat_api::config::DatabaseConfig;
use heartbeat_api::errors::{HeartbeatError, HeartbeatResult};
use heartbeat_api::server::{BotStore, Database};

/// 2024-03-01 12:34:56 UTC
const NOW: i64 = 1_709_296_496_000;

/// Helper: create an in-memory SQLite Database with both tables.
async fn setup_in_memory_db() -> HeartbeatResult<(SqlitePool, Arc<Database>)> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| HeartbeatError::ServerError(format!("db connect failed: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE servers (
            id                  TEXT PRIMARY KEY,
            name                TEXT,
            cfxLicense          TEXT UNIQUE NOT NULL,
            sv_licenseKeyToken  TEXT
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE stock_accounts (
            id                              TEXT PRIMARY KEY,
            assignedServer                  TEXT NOT NULL,
            expireOn                        TEXT,
            entitlementId                   TEXT,
            machineHash                     TEXT,
            lastTicketHeartbeat             TEXT,
            lastEntitlementIdHeartbeat      TEXT,
            lastTicketHeartbeatError        TEXT,
            lastEntitlementIdHeartbeatError TEXT
        );
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "INSERT INTO servers (id, name, cfxLicense, sv_licenseKeyToken) VALUES ('srv-1', NULL, 'cfxk_1', 'token-1')",
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO stock_accounts
            (id, assignedServer, expireOn, entitlementId, machineHash, lastTicketHeartbeat)
        VALUES
            ('bot-1', 'srv-1', '2030-01-01 00:00:00', 'ENT-1', 'hash-1', '2024-03-01 12:00:00'),
            ('bot-2', 'srv-1', NULL, NULL, NULL, '')
        "#,
    )
    .execute(&pool)
    .await?;

    Ok((pool.clone(), Arc::new(Database::SQLite(pool))))
}

async fn read_text(pool: &SqlitePool, column: &str, bot_id: &str) -> Option<String> {
    sqlx::query_scalar::<_, Option<String>>(&format!(
        "SELECT {column} FROM stock_accounts WHERE id = ?"
    ))
    .bind(bot_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn finds_server_by_license() {
    let (_, db) = setup_in_memory_db().await.unwrap();

    let server = assert_ok!(db.find_server_by_license("cfxk_1").await).unwrap();
    assert_eq!(server.id, "srv-1");
    assert_eq!(server.license_key_token.as_deref(), Some("token-1"));
    assert_eq!(server.display_name(), "srv-1");

    assert!(assert_ok!(db.find_server_by_license("cfxk_missing").await).is_none());
}

#[tokio::test]
async fn bot_lookup_is_scoped_to_its_server() {
    let (_, db) = setup_in_memory_db().await.unwrap();

    assert!(assert_ok!(db.find_bot("bot-1", "srv-1").await).is_some());
    assert!(assert_ok!(db.find_bot("bot-1", "srv-2").await).is_none());
    assert!(assert_ok!(db.find_bot("bot-9", "srv-1").await).is_none());
}

#[tokio::test]
async fn stored_text_becomes_epoch_millis() {
    let (_, db) = setup_in_memory_db().await.unwrap();

    let bot = assert_ok!(db.find_bot("bot-1", "srv-1").await).unwrap();
    assert_eq!(bot.expire_on, Some(1_893_456_000_000));
    assert_eq!(bot.last_ticket_heartbeat, Some(1_709_294_400_000));
    assert_eq!(bot.last_entitlement_heartbeat, None);
    assert_eq!(bot.entitlement_id.as_deref(), Some("ENT-1"));
}

#[tokio::test]
async fn blank_timestamps_read_as_absent() {
    let (_, db) = setup_in_memory_db().await.unwrap();

    let bot = assert_ok!(db.find_bot("bot-2", "srv-1").await).unwrap();
    assert_eq!(bot.last_ticket_heartbeat, None);
    assert_eq!(bot.expire_on, None);
    assert_eq!(bot.machine_hash, None);
}

#[tokio::test]
async fn heartbeat_writes_use_the_storage_format() {
    let (pool, db) = setup_in_memory_db().await.unwrap();

    assert_ok!(db.set_last_ticket_heartbeat("bot-1", NOW + 789).await);
    assert_ok!(db.set_last_entitlement_heartbeat("bot-1", NOW).await);

    assert_eq!(
        read_text(&pool, "lastTicketHeartbeat", "bot-1").await.as_deref(),
        Some("2024-03-01 12:34:56")
    );
    assert_eq!(
        read_text(&pool, "lastEntitlementIdHeartbeat", "bot-1").await.as_deref(),
        Some("2024-03-01 12:34:56")
    );

    let bot = assert_ok!(db.find_bot("bot-1", "srv-1").await).unwrap();
    assert_eq!(bot.last_ticket_heartbeat, Some(NOW));
}

#[tokio::test]
async fn error_columns_are_written_verbatim() {
    let (pool, db) = setup_in_memory_db().await.unwrap();

    assert_ok!(
        db.set_ticket_heartbeat_error("bot-1", "ticket/created banned: nope")
            .await
    );
    assert_ok!(
        db.set_entitlement_heartbeat_error("bot-1", "entitlement/heartbeat failed: empty response")
            .await
    );

    assert_eq!(
        read_text(&pool, "lastTicketHeartbeatError", "bot-1").await.as_deref(),
        Some("ticket/created banned: nope")
    );

    let bot = assert_ok!(db.find_bot("bot-1", "srv-1").await).unwrap();
    assert_eq!(
        bot.last_entitlement_heartbeat_error.as_deref(),
        Some("entitlement/heartbeat failed: empty response")
    );
}

#[tokio::test]
async fn updating_an_unknown_bot_is_not_an_error() {
    let (_, db) = setup_in_memory_db().await.unwrap();
    assert_ok!(db.set_last_ticket_heartbeat("ghost", NOW).await);
}

#[tokio::test]
async fn ping_and_backend_name() {
    let (_, db) = setup_in_memory_db().await.unwrap();
    assert!(db.ping().await);
    assert_eq!(db.backend_name(), "sqlite");
}

#[tokio::test]
async fn connect_opens_sqlite_from_config() {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..DatabaseConfig::default()
    };

    let db = assert_ok!(Database::connect(&config).await);
    assert!(db.ping().await);
}

#[tokio::test]
async fn connect_rejects_unknown_backends() {
    let config = DatabaseConfig {
        db_type: "postgres".to_string(),
        ..DatabaseConfig::default()
    };

    match Database::connect(&config).await {
        Err(HeartbeatError::ConfigError(msg)) => assert!(msg.contains("postgres")),
        other => panic!("expected a config error, got {other:?}"),
    }
}
