//! Shared API object types.
//!
//! Status and schedule enums in this module are the single source of truth
//! for both the wire format (lowercase strings) and the core entities.

pub mod business;
pub mod dashboard;
pub mod payout;
pub mod referral;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of a tracked referral event.
///
/// Serde handles the JSON body form; [`FromStr`] accepts the same
/// lowercase names for intake points that carry the kind outside a
/// body, such as a tracking pixel's query string or a redirect path
/// segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Signup,
    Purchase,
    Subscription,
}

impl EventKind {
    /// Whether this event kind carries revenue and accrues commission.
    pub fn is_conversion(self) -> bool {
        matches!(self, EventKind::Purchase | EventKind::Subscription)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Click => write!(f, "click"),
            EventKind::Signup => write!(f, "signup"),
            EventKind::Purchase => write!(f, "purchase"),
            EventKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// Error returned when parsing an unrecognized event kind string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event type '{0}'")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(EventKind::Click),
            "signup" => Ok(EventKind::Signup),
            "purchase" => Ok(EventKind::Purchase),
            "subscription" => Ok(EventKind::Subscription),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// Status of a single recorded conversion.
///
/// Informational only: payout balance math never reads it. A successful
/// payout moves `approved` records to `paid`; nothing currently moves
/// records to `approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl std::fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionStatus::Pending => write!(f, "pending"),
            ConversionStatus::Approved => write!(f, "approved"),
            ConversionStatus::Paid => write!(f, "paid"),
            ConversionStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Status of a payout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    /// Completed and failed payouts accept no further transitions
    /// (reversal of a completed transfer being the one reconciliation
    /// exception).
    pub fn is_terminal(self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Failed)
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "pending"),
            PayoutStatus::Processing => write!(f, "processing"),
            PayoutStatus::Completed => write!(f, "completed"),
            PayoutStatus::Failed => write!(f, "failed"),
        }
    }
}

/// How often a business schedules payouts for its referrers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutSchedule {
    Weekly,
    Biweekly,
    Monthly,
}

impl std::fmt::Display for PayoutSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutSchedule::Weekly => write!(f, "weekly"),
            PayoutSchedule::Biweekly => write!(f, "biweekly"),
            PayoutSchedule::Monthly => write!(f, "monthly"),
        }
    }
}

/// Subscription plan of a business account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Growth,
    Scale,
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plan::Starter => write!(f, "starter"),
            Plan::Growth => write!(f, "growth"),
            Plan::Scale => write!(f, "scale"),
        }
    }
}
