//! Client for the Cfx.re validation service.
//!
//! Two calls are made on behalf of a bot:
//! - `validate/entitlement` keeps the entitlement alive,
//! - `ticket/create` requests a fresh session ticket (and refreshes the
//!   entitlement first, the way a real game client does).
//!
//! Neither call ever returns an error to the caller. Transport failures,
//! empty bodies and bans are all folded into a [`ValidationOutcome`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Proxy};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{HeartbeatTimingConfig, ValidatorConfig};
use crate::errors::{HeartbeatError, HeartbeatResult};
use crate::server::timing::{pause, Jitter};

/// Characters `encodeURIComponent` leaves untouched, which is what the
/// validator expects in form values.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const GAME_NAME: &str = "gta5";
const CLIENT_GUID: &str = "148618792012444134";
const MACHINE_HASH: &str = "AQAL";
const SERVER_ADDRESS: &str = "http%3a%2f%51.91.102.108%3a30120%2f";
const ROS_ID: &str = "1234";
const ENTITLEMENT_F: &str = "%7b%7d";
const ENTITLEMENT_H2: &str = "YyMyxwNpROOEdyxjBu%2bNls1LHzPzx1zTEX7RtDmwD5Eb2MPVgeWNFbNZC3YfGgUnbriTU2jsl7jO0SQ9%2bmDqmU1rLf075r4bxMuKLjcUu2IPy3zVXd2ni2xVJJw8%2bFOoWqaTKIQGggBYEBEBRNOsFNjp6TLqbCwKiqMmc7rl8pLj6SCUm1MpNcBg%2fIE15VmMk4erFf26PdrA4GpAKAP%2fdsM9QaY1GbBnwM4V4xWl8EtLWFPF0XW9xePpm5ZPOjU3OfMAZ2eTF6cNkNsxAGHIMB4VTaKLGWoWmRToEEzbh9wTebY97mYeFdtqF8L%2bnNPVv6y0k4szAwdbInJ2oE73iFj5mZIKLGxqKtNGg9r10nJm2Bk1bTchSWTKlsI%2ffN1vvG6g1fxNDf5%2bJyqGnhktaEMt7L8JTxpgHPuAKtAN795kAM%2fZRgHUUqJzxnH4Ps3jSaMAt5eDpzfdkGvhADFIMMfSEEZ6WqQyvwRw85arnc6IgNYKFlqzGnpsHcWE13elDaRPbgNfMwT7U4Jk31vcfSsadYeqN6Ngad6CeF9zty7GWMklfWcRuaRqtiJvPI3%2fhGymZwPdFHsWvsBEFcbKTWVukjVzaXbuuOH81iY%2fCw7Mbq9A%2f%2fERGFNFW5HXUd9WCZsUooXHJcjVuczxO0BgQLfyEGaaemQSr0RwA3abTe7l5nY4wMC%2fJKkB1AKURTTsJcHhbK0Xrz14b5XOZIZDNlUGQpXweFTMWeualdOAxGUvDnnD0%2fqIZ39zjnPdulZUxCzGt%2fPt1Mt2nsAEJaYq%2fSLBqoahs9UtgGs%2fX9PAqqsnJdsRJ%2bZXKA%2fGfeBr58TCQsDJ8B1CCkqqsmAjItskmOY6w2%2fNGhQw7enImzXwvO4%3d";

/// Ticket values are secrets; only this many characters end up in messages.
const TICKET_PREVIEW_CHARS: usize = 16;

/// Uniform result of a validator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub message: String,
}

impl ValidationOutcome {
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

/// What a bot presents to the validator.
#[derive(Debug, Clone, Copy)]
pub struct BotCredentials<'a> {
    pub machine_hash: &'a str,
    pub entitlement_id: &'a str,
    /// The owning server's `sv_licenseKeyToken`.
    pub license_key_token: &'a str,
}

/// Outbound HTTP seam.
#[async_trait]
pub trait RequestPool: Send + Sync {
    /// POST a pre-encoded form body.
    ///
    /// Returns the response body (JSON when it parses, a string otherwise),
    /// or `None` when the body is empty.
    async fn post_form(&self, url: &str, body: String) -> HeartbeatResult<Option<Value>>;
}

/// Round-robin pool of `reqwest` clients, one per configured proxy.
pub struct ProxyRotatingPool {
    clients: Vec<Client>,
    next: AtomicUsize,
}

impl ProxyRotatingPool {
    pub fn new(config: &ValidatorConfig) -> HeartbeatResult<Self> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let build = |proxy: Option<&str>| -> HeartbeatResult<Client> {
            let mut builder = Client::builder()
                .user_agent(config.user_agent.as_str())
                .default_headers(headers.clone())
                .timeout(Duration::from_secs(config.timeout_secs));

            if let Some(proxy) = proxy {
                let proxy = Proxy::all(proxy)
                    .map_err(|e| HeartbeatError::ConfigError(format!("invalid proxy: {e}")))?;
                builder = builder.proxy(proxy);
            }

            builder
                .build()
                .map_err(|e| HeartbeatError::ConfigError(format!("failed to build client: {e}")))
        };

        let clients = if config.proxies.is_empty() {
            vec![build(None)?]
        } else {
            config
                .proxies
                .iter()
                .map(|proxy| build(Some(proxy)))
                .collect::<HeartbeatResult<Vec<_>>>()?
        };

        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn pick(&self) -> &Client {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[index]
    }
}

#[async_trait]
impl RequestPool for ProxyRotatingPool {
    async fn post_form(&self, url: &str, body: String) -> HeartbeatResult<Option<Value>> {
        let response = self.pick().post(url).body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let payload = decode_body(&text);

        if !status.is_success() {
            // Keep error bodies the validator explains itself; anything else is a transport failure.
            let explained = payload
                .as_ref()
                .is_some_and(|value| value.get("error").is_some());
            if !explained {
                return Err(HeartbeatError::NetworkError(format!(
                    "request failed with status code {}",
                    status.as_u16()
                )));
            }
        }

        Ok(payload)
    }
}

fn decode_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// `encodeURIComponent` equivalent.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Form body for `ticket/create`.
pub fn ticket_form(credentials: &BotCredentials<'_>) -> String {
    format!(
        "gameName={GAME_NAME}&guid={CLIENT_GUID}&machineHash={MACHINE_HASH}&machineHashIndex={}&server={SERVER_ADDRESS}&serverKeyToken={}&token={}",
        encode_component(credentials.machine_hash),
        encode_component(credentials.license_key_token),
        credentials.entitlement_id,
    )
}

/// Form body for `validate/entitlement`.
pub fn entitlement_form(credentials: &BotCredentials<'_>) -> String {
    format!(
        "entitlementId={}&f={ENTITLEMENT_F}&gameName={GAME_NAME}&h2={ENTITLEMENT_H2}&machineHash={MACHINE_HASH}&machineHashIndex={}&rosId={ROS_ID}",
        credentials.entitlement_id,
        encode_component(credentials.machine_hash),
    )
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// The body's `error` field when present, the whole body otherwise.
fn explain(body: Option<&Value>) -> String {
    match body {
        Some(value) => value
            .get("error")
            .filter(|error| !error.is_null())
            .map(render)
            .unwrap_or_else(|| render(value)),
        None => "empty response".to_string(),
    }
}

/// Interpret a `ticket/create` response body.
pub fn interpret_ticket_response(body: Option<&Value>) -> ValidationOutcome {
    let ticket = body
        .and_then(|value| value.get("ticket"))
        .and_then(Value::as_str)
        .filter(|ticket| !ticket.is_empty());

    if let Some(ticket) = ticket {
        let preview: String = ticket.chars().take(TICKET_PREVIEW_CHARS).collect();
        return ValidationOutcome::success(format!("ticket/created success: {preview}..."));
    }

    let banned = body
        .and_then(|value| value.get("error"))
        .and_then(Value::as_str)
        .is_some_and(|error| error.contains("banned"));

    if banned {
        ValidationOutcome::failure(format!("ticket/created banned: {}", explain(body)))
    } else {
        ValidationOutcome::failure(format!("ticket/created failed: {}", explain(body)))
    }
}

/// JavaScript truthiness: `null`, `false`, `0` and `""` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Interpret a `validate/entitlement` response body.
///
/// Any truthy body counts as success.
pub fn interpret_entitlement_response(body: Option<&Value>) -> ValidationOutcome {
    match body.filter(|value| is_truthy(value)) {
        Some(value) => {
            ValidationOutcome::success(format!("entitlement/heartbeat success: {}", render(value)))
        }
        None => ValidationOutcome::failure(format!(
            "entitlement/heartbeat failed: {}",
            explain(body)
        )),
    }
}

/// Talks to the validation service through a [`RequestPool`], pacing calls
/// with a [`Jitter`] source.
pub struct RemoteValidator {
    pool: Arc<dyn RequestPool>,
    jitter: Arc<dyn Jitter>,
    ticket_url: String,
    entitlement_url: String,
    timing: HeartbeatTimingConfig,
}

impl RemoteValidator {
    pub fn new(
        pool: Arc<dyn RequestPool>,
        jitter: Arc<dyn Jitter>,
        config: &ValidatorConfig,
        timing: &HeartbeatTimingConfig,
    ) -> Self {
        Self {
            pool,
            jitter,
            ticket_url: config.ticket_url.clone(),
            entitlement_url: config.entitlement_url.clone(),
            timing: timing.clone(),
        }
    }

    /// Request a new session ticket.
    ///
    /// Pauses, refreshes the entitlement (its outcome is not consulted),
    /// pauses again, then submits the ticket request.
    pub async fn send_ticket_heartbeat(&self, credentials: &BotCredentials<'_>) -> ValidationOutcome {
        pause(
            self.jitter.as_ref(),
            self.timing.ticket_jitter_min_ms,
            self.timing.ticket_jitter_max_ms,
        )
        .await;

        let prerequisite = self.send_entitlement_heartbeat(credentials).await;
        debug!(success = prerequisite.success, "entitlement refreshed before ticket request");

        pause(
            self.jitter.as_ref(),
            self.timing.submit_jitter_min_ms,
            self.timing.submit_jitter_max_ms,
        )
        .await;

        match self
            .pool
            .post_form(&self.ticket_url, ticket_form(credentials))
            .await
        {
            Ok(body) => interpret_ticket_response(body.as_ref()),
            Err(e) => {
                warn!("ticket/create request failed: {e}");
                ValidationOutcome::failure(format!("ticket/created failed: {e}"))
            }
        }
    }

    /// Re-validate the bot's entitlement.
    pub async fn send_entitlement_heartbeat(
        &self,
        credentials: &BotCredentials<'_>,
    ) -> ValidationOutcome {
        match self
            .pool
            .post_form(&self.entitlement_url, entitlement_form(credentials))
            .await
        {
            Ok(body) => interpret_entitlement_response(body.as_ref()),
            Err(e) => {
                warn!("validate/entitlement request failed: {e}");
                ValidationOutcome::failure(format!("entitlement/heartbeat failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> BotCredentials<'static> {
        BotCredentials {
            machine_hash: "ab+c/d=",
            entitlement_id: "ENT-1",
            license_key_token: "cfxk_token 1",
        }
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("a b+c/d=e"), "a%20b%2Bc%2Fd%3De");
        assert_eq!(encode_component("-_.!~*'()"), "-_.!~*'()");
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn ticket_form_encodes_hash_and_token_but_not_entitlement() {
        let form = ticket_form(&credentials());
        assert!(form.starts_with("gameName=gta5&guid=148618792012444134&machineHash=AQAL"));
        assert!(form.contains("&machineHashIndex=ab%2Bc%2Fd%3D&"));
        assert!(form.contains("&server=http%3a%2f%51.91.102.108%3a30120%2f&"));
        assert!(form.contains("&serverKeyToken=cfxk_token%201&"));
        assert!(form.ends_with("&token=ENT-1"));
    }

    #[test]
    fn entitlement_form_layout() {
        let form = entitlement_form(&credentials());
        assert!(form.starts_with("entitlementId=ENT-1&f=%7b%7d&gameName=gta5&h2=YyMyxwNp"));
        assert!(form.ends_with("&machineHash=AQAL&machineHashIndex=ab%2Bc%2Fd%3D&rosId=1234"));
    }

    #[test]
    fn ticket_success_truncates_the_ticket() {
        let body = json!({ "ticket": "0123456789abcdefSECRET" });
        let outcome = interpret_ticket_response(Some(&body));
        assert!(outcome.success);
        assert_eq!(outcome.message, "ticket/created success: 0123456789abcdef...");
    }

    #[test]
    fn banned_ticket_is_reported_distinctly() {
        let body = json!({ "error": "This account has been banned." });
        let outcome = interpret_ticket_response(Some(&body));
        assert!(!outcome.success);
        assert_eq!(
            outcome.message,
            "ticket/created banned: This account has been banned."
        );
    }

    #[test]
    fn generic_ticket_failure_uses_error_or_body() {
        let with_error = json!({ "error": "rate limited" });
        assert_eq!(
            interpret_ticket_response(Some(&with_error)).message,
            "ticket/created failed: rate limited"
        );

        let without_error = json!({ "status": 3 });
        assert_eq!(
            interpret_ticket_response(Some(&without_error)).message,
            r#"ticket/created failed: {"status":3}"#
        );

        assert_eq!(
            interpret_ticket_response(None).message,
            "ticket/created failed: empty response"
        );
    }

    #[test]
    fn empty_ticket_field_is_not_success() {
        let body = json!({ "ticket": "" });
        assert!(!interpret_ticket_response(Some(&body)).success);
    }

    #[test]
    fn entitlement_succeeds_on_any_body() {
        let outcome = interpret_entitlement_response(Some(&Value::String("OK".into())));
        assert_eq!(outcome, ValidationOutcome::success("entitlement/heartbeat success: OK"));

        let failure = interpret_entitlement_response(None);
        assert!(!failure.success);
        assert!(failure.message.starts_with("entitlement/heartbeat failed:"));

        assert!(interpret_entitlement_response(Some(&json!({}))).success);
        assert!(interpret_entitlement_response(Some(&json!(1))).success);
    }

    #[test]
    fn falsy_entitlement_bodies_are_failures() {
        for body in [json!(null), json!(false), json!(""), json!(0), json!(0.0)] {
            let outcome = interpret_entitlement_response(Some(&body));
            assert!(!outcome.success, "{body} counted as success");
            assert!(outcome.message.starts_with("entitlement/heartbeat failed: "));
        }

        assert_eq!(
            interpret_entitlement_response(Some(&json!(null))).message,
            "entitlement/heartbeat failed: null"
        );
        assert_eq!(
            interpret_entitlement_response(Some(&json!(false))).message,
            "entitlement/heartbeat failed: false"
        );
    }

    #[test]
    fn decodes_json_text_and_empty_bodies() {
        assert_eq!(decode_body(""), None);
        assert_eq!(decode_body("{\"a\":1}"), Some(json!({ "a": 1 })));
        assert_eq!(decode_body("plain"), Some(Value::String("plain".into())));
    }

    #[test]
    fn pool_builds_one_client_per_proxy() {
        let mut config = ValidatorConfig::default();
        assert_eq!(ProxyRotatingPool::new(&config).unwrap().len(), 1);

        config.proxies = vec![
            "http://127.0.0.1:3128".to_string(),
            "http://127.0.0.1:3129".to_string(),
        ];
        assert_eq!(ProxyRotatingPool::new(&config).unwrap().len(), 2);
    }
}
