//! Business account entity.

use compact_str::CompactString;
use oreft_sdk::objects::business::{BusinessProfile, BusinessSettingsView, BusinessStatsView};
use oreft_sdk::objects::{PayoutSchedule, Plan};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;
use url::Url;

/// Per-business tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessSettings {
    /// Prepended to every generated referral code.
    pub code_prefix: String,
    pub min_payout_amount: Decimal,
    pub payout_hold_days: u32,
}

/// Aggregate counters maintained across all of the business's referrals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessStats {
    pub total_referrals: u64,
    pub total_revenue: Decimal,
    pub total_commissions_paid: Decimal,
}

/// A registered business account.
///
/// `version` is the optimistic-concurrency token checked by
/// [`Store::update_business`](crate::store::Store::update_business).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub business_id: CompactString,
    pub name: String,
    /// Stored lowercased; unique across active and inactive accounts.
    pub email: String,
    pub api_key: String,
    /// Gateway destination account for business-level payouts.
    pub payout_account_id: Option<String>,
    pub default_commission_rate: Decimal,
    pub payout_schedule: PayoutSchedule,
    pub webhook_url: Option<Url>,
    pub settings: BusinessSettings,
    pub stats: BusinessStats,
    pub plan: Plan,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: u64,
}

impl Business {
    /// Next date the schedule would pay out, counted from `today`.
    ///
    /// Weekly pays on the upcoming Sunday (a full week away when `today`
    /// is itself a Sunday), biweekly two weeks out, monthly on the first
    /// of the next month.
    pub fn next_payout_date(&self, today: Date) -> Date {
        match self.payout_schedule {
            PayoutSchedule::Weekly => {
                let days_until_sunday = 7 - i64::from(today.weekday().number_days_from_sunday());
                today + time::Duration::days(days_until_sunday)
            }
            PayoutSchedule::Biweekly => today + time::Duration::days(14),
            PayoutSchedule::Monthly => {
                let (year, month) = match today.month() {
                    time::Month::December => (today.year() + 1, time::Month::January),
                    month => (today.year(), month.next()),
                };
                // The first of a month always exists.
                Date::from_calendar_date(year, month, 1).unwrap_or(today)
            }
        }
    }

    /// Wire-level profile view, with the API key omitted.
    pub fn profile(&self) -> BusinessProfile {
        BusinessProfile {
            business_id: self.business_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            default_commission_rate: self.default_commission_rate,
            payout_schedule: self.payout_schedule,
            webhook_url: self.webhook_url.clone(),
            settings: BusinessSettingsView {
                code_prefix: self.settings.code_prefix.clone(),
                min_payout_amount: self.settings.min_payout_amount,
                payout_hold_days: self.settings.payout_hold_days,
            },
            stats: BusinessStatsView {
                total_referrals: self.stats.total_referrals,
                total_revenue: self.stats.total_revenue,
                total_commissions_paid: self.stats.total_commissions_paid,
            },
            plan: self.plan,
            payment_account_connected: self.payout_account_id.is_some(),
        }
    }
}
