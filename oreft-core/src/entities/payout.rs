//! Payout entity and its state machine.
//!
//! A payout is born `processing` (the record is persisted before the
//! gateway is called), then moves to `completed` or `failed`. A completed
//! payout can later be `reversed` back to failed when the gateway unwinds
//! the transfer.

use compact_str::CompactString;
use oreft_sdk::objects::PayoutStatus;
use oreft_sdk::objects::payout::PayoutReceipt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A state transition the payout state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid payout transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: PayoutStatus,
    pub to: PayoutStatus,
}

/// One payout attempt for one referral.
///
/// `amount` is the gross pending balance drained; `net_amount` is what the
/// gateway actually transfers after the platform fee.
///
/// `version` is the optimistic-concurrency token checked by
/// [`Store::update_payout`](crate::store::Store::update_payout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub business_id: CompactString,
    pub referral_id: Uuid,
    pub referral_code: CompactString,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    pub status: PayoutStatus,
    pub transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
    pub version: u64,
}

impl Payout {
    /// Build a fresh payout in the `processing` state.
    pub fn new_processing(
        business_id: CompactString,
        referral_id: Uuid,
        referral_code: CompactString,
        amount: Decimal,
        platform_fee: Decimal,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_id,
            referral_id,
            referral_code,
            amount,
            platform_fee,
            net_amount: amount - platform_fee,
            status: PayoutStatus::Processing,
            transfer_id: None,
            failure_reason: None,
            created_at,
            processed_at: None,
            version: 0,
        }
    }

    /// Record a successful gateway transfer. Valid only from `processing`.
    pub fn mark_completed(&mut self, transfer_id: String, at: i64) -> Result<(), InvalidTransition> {
        if self.status != PayoutStatus::Processing {
            return Err(InvalidTransition {
                from: self.status,
                to: PayoutStatus::Completed,
            });
        }
        self.status = PayoutStatus::Completed;
        self.transfer_id = Some(transfer_id);
        self.processed_at = Some(at);
        Ok(())
    }

    /// Record a failed transfer attempt. Valid from `pending` or
    /// `processing`.
    pub fn mark_failed(&mut self, reason: String, at: i64) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() {
            return Err(InvalidTransition {
                from: self.status,
                to: PayoutStatus::Failed,
            });
        }
        self.status = PayoutStatus::Failed;
        self.failure_reason = Some(reason);
        self.processed_at = Some(at);
        Ok(())
    }

    /// Unwind a completed payout after the gateway reversed its transfer.
    pub fn reverse(&mut self, reason: String, at: i64) -> Result<(), InvalidTransition> {
        if self.status != PayoutStatus::Completed {
            return Err(InvalidTransition {
                from: self.status,
                to: PayoutStatus::Failed,
            });
        }
        self.status = PayoutStatus::Failed;
        self.failure_reason = Some(reason);
        self.processed_at = Some(at);
        Ok(())
    }

    /// Wire-level view of this payout.
    pub fn receipt(&self) -> PayoutReceipt {
        PayoutReceipt {
            id: self.id,
            referral_code: self.referral_code.clone(),
            amount: self.amount,
            platform_fee: self.platform_fee,
            net_amount: self.net_amount,
            status: self.status,
            transfer_id: self.transfer_id.clone(),
            failure_reason: self.failure_reason.clone(),
            created_at: self.created_at,
            processed_at: self.processed_at,
        }
    }
}
