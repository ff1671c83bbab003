//! Decides which heartbeat, if any, a bot is due for.

use crate::config::HeartbeatTimingConfig;

/// Result of evaluating a bot's heartbeat timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatDue {
    /// Request a new ticket. `first` when no ticket heartbeat was ever recorded.
    Ticket { first: bool },
    /// Re-validate the entitlement only.
    Entitlement { first: bool },
    /// Nothing to send yet.
    NotDue { elapsed_ms: i64, remaining_ms: i64 },
}

/// Thresholds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub ticket_interval_ms: i64,
    pub entitlement_gate_ms: i64,
    pub entitlement_interval_ms: i64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_config(&HeartbeatTimingConfig::default())
    }
}

impl StalenessPolicy {
    pub fn from_config(config: &HeartbeatTimingConfig) -> Self {
        Self {
            ticket_interval_ms: config.ticket_interval().as_millis() as i64,
            entitlement_gate_ms: config.entitlement_gate().as_millis() as i64,
            entitlement_interval_ms: config.entitlement_interval().as_millis() as i64,
        }
    }

    /// Ticket first, then entitlement, else nothing.
    ///
    /// A stale ticket only wins while the entitlement heartbeat is itself
    /// older than the gate; otherwise the entitlement rule applies. A missing
    /// entitlement heartbeat counts as old.
    pub fn evaluate(
        &self,
        now_ms: i64,
        last_ticket: Option<i64>,
        last_entitlement: Option<i64>,
    ) -> HeartbeatDue {
        match last_ticket {
            None => return HeartbeatDue::Ticket { first: true },
            Some(ticket) if now_ms - ticket > self.ticket_interval_ms => {
                let gate_open =
                    last_entitlement.is_none_or(|entitlement| now_ms - entitlement > self.entitlement_gate_ms);
                if gate_open {
                    return HeartbeatDue::Ticket { first: false };
                }
            }
            Some(_) => {}
        }

        match last_entitlement {
            None => HeartbeatDue::Entitlement { first: true },
            Some(entitlement) => {
                let elapsed_ms = now_ms - entitlement;
                if elapsed_ms > self.entitlement_interval_ms {
                    HeartbeatDue::Entitlement { first: false }
                } else {
                    HeartbeatDue::NotDue {
                        elapsed_ms,
                        remaining_ms: (self.entitlement_interval_ms - elapsed_ms).max(0),
                    }
                }
            }
        }
    }
}
