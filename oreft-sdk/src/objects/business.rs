//! Business account request and response types.
//!
//! Used by the business-facing API: registration, profile, settings,
//! API key rotation, and payment-account onboarding.

use super::{PayoutSchedule, Plan};
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

/// Request body for registering a new business account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterBusinessRequest {
    pub name: String,
    pub email: String,
    pub webhook_url: Option<Url>,
    pub default_commission_rate: Option<Decimal>,
    pub payout_schedule: Option<PayoutSchedule>,
}

/// Response returned after a successful registration.
///
/// This is the only place (besides key rotation) where the API key is
/// returned in cleartext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterBusinessResponse {
    pub business_id: CompactString,
    pub name: String,
    pub email: String,
    pub api_key: String,
    pub default_commission_rate: Decimal,
    pub payout_schedule: PayoutSchedule,
}

/// Per-business tuning knobs, nested under the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessSettingsView {
    pub code_prefix: String,
    pub min_payout_amount: Decimal,
    pub payout_hold_days: u32,
}

/// Aggregate counters for a business account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessStatsView {
    pub total_referrals: u64,
    pub total_revenue: Decimal,
    pub total_commissions_paid: Decimal,
}

/// Full business profile as returned by the profile endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub business_id: CompactString,
    pub name: String,
    pub email: String,
    pub default_commission_rate: Decimal,
    pub payout_schedule: PayoutSchedule,
    pub webhook_url: Option<Url>,
    pub settings: BusinessSettingsView,
    pub stats: BusinessStatsView,
    pub plan: Plan,
    pub payment_account_connected: bool,
}

/// Shallow patch for the nested settings object.
///
/// Present fields replace the stored value; absent fields are untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub code_prefix: Option<String>,
    pub min_payout_amount: Option<Decimal>,
    pub payout_hold_days: Option<u32>,
}

/// Request body for updating mutable business settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsRequest {
    pub default_commission_rate: Option<Decimal>,
    pub payout_schedule: Option<PayoutSchedule>,
    pub webhook_url: Option<Url>,
    pub settings: Option<SettingsPatch>,
}

/// Request body for payment-account onboarding (business or referrer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAccountRequest {
    pub refresh_url: Url,
    pub return_url: Url,
}

/// Response carrying the gateway onboarding link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAccountResponse {
    pub onboarding_url: Url,
    pub account_id: String,
}

/// Response returned after rotating the API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatedApiKey {
    pub api_key: String,
}
