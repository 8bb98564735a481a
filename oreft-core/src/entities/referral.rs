//! Referral (referrer) entity and its earnings ledger.

use compact_str::CompactString;
use oreft_sdk::objects::ConversionStatus;
use oreft_sdk::objects::referral::EarningsView;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attempted to move more out of pending earnings than is there.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("settlement of {requested} exceeds pending balance {pending}")]
pub struct InsufficientPending {
    pub requested: Decimal,
    pub pending: Decimal,
}

/// Three-bucket earnings ledger of one referral.
///
/// Invariant: `total == pending + paid` at all times. `credit`, `settle`
/// and `restore` are the only mutations, and each preserves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Earnings {
    pub pending: Decimal,
    pub paid: Decimal,
    pub total: Decimal,
}

impl Earnings {
    /// Accrue a newly earned commission.
    pub fn credit(&mut self, amount: Decimal) {
        self.pending += amount;
        self.total += amount;
    }

    /// Move a successfully paid-out amount from pending to paid.
    pub fn settle(&mut self, amount: Decimal) -> Result<(), InsufficientPending> {
        if amount > self.pending {
            return Err(InsufficientPending {
                requested: amount,
                pending: self.pending,
            });
        }
        self.pending -= amount;
        self.paid += amount;
        Ok(())
    }

    /// Undo a settlement after the gateway reversed the transfer.
    ///
    /// Only called for amounts previously settled, so `paid` never goes
    /// negative in practice.
    pub fn restore(&mut self, amount: Decimal) {
        self.pending += amount;
        self.paid -= amount;
    }

    pub fn is_balanced(&self) -> bool {
        self.total == self.pending + self.paid
    }

    pub fn view(&self) -> EarningsView {
        EarningsView {
            pending: self.pending,
            paid: self.paid,
            total: self.total,
        }
    }
}

/// Event counters of one referral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub clicks: u64,
    pub signups: u64,
    pub conversions: u64,
}

/// One revenue-carrying event recorded against a referral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Unix seconds.
    pub date: i64,
    pub order_id: String,
    pub amount: Decimal,
    pub commission: Decimal,
    pub product: String,
    pub status: ConversionStatus,
}

/// A referrer enrolled with a business, addressed by referral code.
///
/// `version` is the optimistic-concurrency token checked by
/// [`Store::update_referral`](crate::store::Store::update_referral).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub business_id: CompactString,
    /// The business's identifier for this user; one code per
    /// (business, user) pair.
    pub user_id: String,
    /// Uppercase, globally unique.
    pub code: CompactString,
    pub email: String,
    pub name: String,
    /// Frozen at creation; later changes to the business default do not
    /// reprice existing referrals.
    pub commission_rate: Decimal,
    /// Gateway destination account receiving this referral's payouts.
    pub payout_account_id: Option<String>,
    pub stats: ReferralStats,
    pub earnings: Earnings,
    pub conversions: Vec<ConversionRecord>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: u64,
}
