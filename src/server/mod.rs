//! Server-side components.
//!
//! - `database`   → `BotStore` over SQLite/MySQL
//! - `store`      → storage seam and records
//! - `heartbeat`  → staleness rules deciding which heartbeat is due
//! - `validator`  → outbound calls to the validation service
//! - `timing`     → clock and jitter sources
//! - `handlers`   → Axum HTTP handlers
//! - `api_error`  → HTTP rejections
//! - `logging`    → request logging middleware and health types
//! - `routes`     → Router builder

pub mod api_error;
pub mod database;
pub mod handlers;
pub mod heartbeat;
pub mod logging;
pub mod routes;
pub mod store;
pub mod timing;
pub mod validator;

pub use api_error::{ApiRejection, HeartbeatFailure};
pub use database::Database;
pub use handlers::{
    health_handler, heartbeat_handler, process_heartbeat, AppState, HeartbeatRequest,
    HeartbeatResponse,
};
pub use heartbeat::{HeartbeatDue, StalenessPolicy};
pub use routes::build_router;
pub use store::{BotAccount, BotStore, ServerRecord};
pub use timing::{Clock, Jitter, NoJitter, RandomJitter, SystemClock};
pub use validator::{
    BotCredentials, ProxyRotatingPool, RemoteValidator, RequestPool, ValidationOutcome,
};
