//! Payout request and response types.

use super::PayoutStatus;
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for initiating a payout for a referral code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePayoutRequest {
    pub code: String,
}

/// One payout attempt, as exposed on the wire.
///
/// Timestamps are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub id: Uuid,
    pub referral_code: CompactString,
    /// Gross amount moved out of pending earnings.
    pub amount: Decimal,
    /// Fee withheld by the platform (absorbed from the gross amount).
    pub platform_fee: Decimal,
    /// Amount actually transferred to the referrer.
    pub net_amount: Decimal,
    pub status: PayoutStatus,
    /// Gateway-side transfer identifier, present once a transfer was
    /// accepted.
    pub transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}
