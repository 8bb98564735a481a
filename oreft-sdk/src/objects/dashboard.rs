//! Business dashboard response types.
//!
//! Aggregates computed across every referral of one business.

use super::ConversionStatus;
use super::payout::PayoutReceipt;
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cross-referral totals for one business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_referrers: u64,
    /// Referrers with at least one conversion.
    pub active_referrers: u64,
    pub total_clicks: u64,
    pub total_signups: u64,
    pub total_conversions: u64,
    /// Conversions per click, as a percentage rounded to two decimals.
    pub conversion_rate: Decimal,
    pub total_revenue: Decimal,
    pub avg_order_value: Decimal,
    pub commissions_pending: Decimal,
    pub commissions_paid: Decimal,
    pub total_commissions: Decimal,
}

/// One entry of the top-referrers leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopReferrer {
    pub code: CompactString,
    pub name: String,
    pub conversions: u64,
    pub revenue: Decimal,
    pub earnings: Decimal,
}

/// One recent conversion, annotated with its referrer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentConversion {
    pub referrer_code: CompactString,
    pub referrer_name: String,
    pub date: i64,
    pub order_id: String,
    pub amount: Decimal,
    pub commission: Decimal,
    pub product: String,
    pub status: ConversionStatus,
}

/// Full dashboard payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub business_id: CompactString,
    pub business_name: String,
    pub summary: DashboardSummary,
    pub top_referrers: Vec<TopReferrer>,
    pub recent_conversions: Vec<RecentConversion>,
    pub recent_payouts: Vec<PayoutReceipt>,
}
