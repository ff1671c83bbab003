use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::HeartbeatConfig;
use crate::server::api_error::{ApiRejection, HeartbeatFailure};
use crate::server::heartbeat::{HeartbeatDue, StalenessPolicy};
use crate::server::logging::{log_heartbeat_event, HealthResponse, HeartbeatEvent};
use crate::server::store::{BotAccount, BotStore, ServerRecord};
use crate::server::timing::Clock;
use crate::server::validator::{BotCredentials, RemoteValidator};

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BotStore>,
    pub validator: Arc<RemoteValidator>,
    pub clock: Arc<dyn Clock>,
    pub policy: StalenessPolicy,
    pub expected_version: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BotStore>,
        validator: Arc<RemoteValidator>,
        clock: Arc<dyn Clock>,
        config: &HeartbeatConfig,
    ) -> Self {
        Self {
            store,
            validator,
            clock,
            policy: StalenessPolicy::from_config(&config.heartbeat),
            expected_version: config.client.expected_version.clone(),
        }
    }
}

/// Body of `POST /heartbeat`.
///
/// Fields are kept as raw JSON so that a number where a string was expected
/// still reaches the handler's own checks instead of an extractor rejection.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HeartbeatRequest {
    pub bot_id: Option<Value>,
    #[serde(rename = "cfxLicense")]
    pub cfx_license: Option<Value>,
    pub version: Option<Value>,
}

impl HeartbeatRequest {
    /// The bot id as text, when the client sent one.
    pub fn bot_id_text(&self) -> Option<String> {
        identifier(&self.bot_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeartbeatResponse {
    pub success: bool,
    pub message: String,
}

impl HeartbeatResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A validated heartbeat request.
#[derive(Debug)]
struct HeartbeatTarget {
    bot_id: String,
    cfx_license: String,
}

/// Strings and numbers are accepted as identifiers. Null, empty strings and
/// anything else count as absent.
fn identifier(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

/// Any non-null, non-empty version is compared as text.
fn version_text(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Version and required-field checks. Runs before any store access.
fn check_request(
    payload: &HeartbeatRequest,
    expected_version: &str,
) -> Result<HeartbeatTarget, ApiRejection> {
    match version_text(&payload.version) {
        None => return Err(ApiRejection::client_outdated(expected_version)),
        Some(version) if version != expected_version => {
            return Err(ApiRejection::version_mismatch(&version, expected_version));
        }
        Some(_) => {}
    }

    match (identifier(&payload.bot_id), identifier(&payload.cfx_license)) {
        (Some(bot_id), Some(cfx_license)) => Ok(HeartbeatTarget {
            bot_id,
            cfx_license,
        }),
        _ => Err(ApiRejection::missing_fields()),
    }
}

/// Resolve the server by license, then the bot scoped to that server.
async fn load_bot(
    store: &dyn BotStore,
    target: &HeartbeatTarget,
) -> Result<(ServerRecord, BotAccount), HeartbeatFailure> {
    let cfx_license = target.cfx_license.trim();

    let server = store
        .find_server_by_license(cfx_license)
        .await?
        .ok_or_else(|| ApiRejection::server_not_found(cfx_license))?;

    let bot = store
        .find_bot(&target.bot_id, &server.id)
        .await?
        .ok_or_else(ApiRejection::bot_not_found)?;

    Ok((server, bot))
}

async fn run_ticket_heartbeat(
    state: &AppState,
    server: &ServerRecord,
    bot: &BotAccount,
    credentials: &BotCredentials<'_>,
    first: bool,
) -> Result<HeartbeatResponse, HeartbeatFailure> {
    if first {
        info!(bot_id = %bot.id, "First ticket heartbeat");
    } else {
        info!(bot_id = %bot.id, "Ticket heartbeat due");
    }

    // Claim the slot before the slow remote call so overlapping requests skip it.
    state
        .store
        .set_last_ticket_heartbeat(&bot.id, state.clock.now_ms())
        .await?;

    let outcome = state.validator.send_ticket_heartbeat(credentials).await;

    if outcome.success {
        state
            .store
            .set_last_ticket_heartbeat(&bot.id, state.clock.now_ms())
            .await?;
        log_heartbeat_event(
            HeartbeatEvent::TicketSucceeded,
            &bot.id,
            Some(server.display_name()),
        );
        Ok(HeartbeatResponse::success(format!(
            "tHB success for bot {}",
            bot.id
        )))
    } else {
        state
            .store
            .set_ticket_heartbeat_error(&bot.id, &outcome.message)
            .await?;
        log_heartbeat_event(HeartbeatEvent::TicketFailed, &bot.id, Some(&outcome.message));
        Ok(HeartbeatResponse::failure(format!(
            "tHB failed for bot {}",
            bot.id
        )))
    }
}

async fn run_entitlement_heartbeat(
    state: &AppState,
    server: &ServerRecord,
    bot: &BotAccount,
    credentials: &BotCredentials<'_>,
    first: bool,
) -> Result<HeartbeatResponse, HeartbeatFailure> {
    if first {
        info!(bot_id = %bot.id, "First entitlement heartbeat");
    }

    let outcome = state.validator.send_entitlement_heartbeat(credentials).await;

    if outcome.success {
        state
            .store
            .set_last_entitlement_heartbeat(&bot.id, state.clock.now_ms())
            .await?;
        log_heartbeat_event(
            HeartbeatEvent::EntitlementSucceeded,
            &bot.id,
            Some(server.display_name()),
        );
        Ok(HeartbeatResponse::success(format!(
            "eHB success for bot {}",
            bot.id
        )))
    } else {
        state
            .store
            .set_entitlement_heartbeat_error(&bot.id, &outcome.message)
            .await?;
        log_heartbeat_event(
            HeartbeatEvent::EntitlementFailed,
            &bot.id,
            Some(&outcome.message),
        );
        Ok(HeartbeatResponse::failure(format!(
            "eHB failed for bot {}",
            bot.id
        )))
    }
}

fn seconds(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

/// Run one heartbeat request end to end.
pub async fn process_heartbeat(
    state: &AppState,
    payload: &HeartbeatRequest,
) -> Result<HeartbeatResponse, HeartbeatFailure> {
    let target = check_request(payload, &state.expected_version)?;
    let (server, bot) = load_bot(state.store.as_ref(), &target).await?;

    let now = state.clock.now_ms();
    if let Some(expire_on) = bot.expire_on.filter(|_| bot.is_expired(now)) {
        log_heartbeat_event(HeartbeatEvent::Expired, &bot.id, None);
        return Err(ApiRejection::bot_expired(&bot.id, expire_on).into());
    }

    let credentials = BotCredentials {
        machine_hash: bot.machine_hash.as_deref().unwrap_or_default(),
        entitlement_id: bot.entitlement_id.as_deref().unwrap_or_default(),
        license_key_token: server.license_key_token.as_deref().unwrap_or_default(),
    };

    match state.policy.evaluate(
        now,
        bot.last_ticket_heartbeat,
        bot.last_entitlement_heartbeat,
    ) {
        HeartbeatDue::Ticket { first } => {
            run_ticket_heartbeat(state, &server, &bot, &credentials, first).await
        }
        HeartbeatDue::Entitlement { first } => {
            run_entitlement_heartbeat(state, &server, &bot, &credentials, first).await
        }
        HeartbeatDue::NotDue {
            elapsed_ms,
            remaining_ms,
        } => {
            let message = format!(
                "Skipping HB cause last HB was {} seconds ago, next one in {} seconds",
                seconds(elapsed_ms),
                seconds(remaining_ms)
            );
            debug!(bot_id = %bot.id, "{message}");
            log_heartbeat_event(HeartbeatEvent::Skipped, &bot.id, None);
            Ok(HeartbeatResponse::failure(message))
        }
    }
}

/// `POST /heartbeat`
pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, HeartbeatFailure> {
    match process_heartbeat(&state, &payload).await {
        Ok(response) => Ok(Json(response)),
        Err(HeartbeatFailure::Internal(e)) => {
            error!(
                bot_id = payload.bot_id_text().unwrap_or_default(),
                "Error in heartbeat: {e}"
            );
            Err(HeartbeatFailure::Internal(e))
        }
        Err(rejection) => Err(rejection),
    }
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.store.ping().await;
    Json(HealthResponse::new(connected, state.store.backend_name()))
}
