//! Referral request and response types.
//!
//! Used by the tracking API: code creation, event recording, and per-code
//! statistics.

use super::{ConversionStatus, EventKind};
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request body for issuing (or re-fetching) a referral code for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReferralRequest {
    pub user_id: String,
    pub email: String,
    pub name: String,
    /// Overrides the business default when present; frozen at creation.
    pub commission_rate: Option<Decimal>,
}

/// Pre-composed social share links for a referral code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLinks {
    pub facebook: String,
    pub twitter: String,
    pub email: String,
}

impl ShareLinks {
    /// Compose share links for `code` promoting `business_name`.
    pub fn for_code(code: &str, business_name: &str) -> Self {
        let message = urlencoding::encode(&format!(
            "Check out {business_name}! Use my code {code} for a special offer."
        ))
        .into_owned();
        Self {
            facebook: format!("https://www.facebook.com/sharer/sharer.php?quote={message}"),
            twitter: format!("https://twitter.com/intent/tweet?text={message}"),
            email: format!(
                "mailto:?subject=Check out {}&body={message}",
                urlencoding::encode(business_name)
            ),
        }
    }
}

/// Compose the public tracking URL for a referral code.
pub fn tracking_url(base_url: &str, code: &str) -> String {
    format!("{base_url}?ref={code}")
}

/// Response returned after a referral code is issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReferralResponse {
    pub code: CompactString,
    pub tracking_url: String,
    pub share_links: ShareLinks,
    /// True when the (business, user) pair already had a code and the
    /// existing one was returned.
    pub existing: bool,
}

/// Request body for recording a referral event against a code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEventRequest {
    pub code: String,
    pub event_type: EventKind,
    /// Required (and strictly positive) for purchase/subscription events.
    pub amount: Option<Decimal>,
    pub order_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Snapshot of the referrer included in a track-event response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferrerSummary {
    pub name: String,
    pub total_earnings: Decimal,
    pub lifetime_referrals: u64,
}

/// Response returned after an event is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEventResponse {
    pub commission_earned: Decimal,
    pub referrer: ReferrerSummary,
    /// Next payout date implied by the business's payout schedule.
    pub payout_scheduled: time::Date,
}

/// Pending/paid/lifetime earnings of a referral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsView {
    pub pending: Decimal,
    pub paid: Decimal,
    pub total: Decimal,
}

/// One recorded conversion, as exposed in stats responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionView {
    pub date: i64,
    pub order_id: String,
    pub amount: Decimal,
    pub commission: Decimal,
    pub product: String,
    pub status: ConversionStatus,
}

/// Response for the per-code statistics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralStatsResponse {
    pub code: CompactString,
    pub clicks: u64,
    pub signups: u64,
    pub conversions: u64,
    /// Conversions per click, as a percentage rounded to one decimal.
    pub conversion_rate: Decimal,
    pub earnings: EarningsView,
    /// Top conversions by amount, largest first (at most ten).
    pub top_referrals: Vec<ConversionView>,
}
