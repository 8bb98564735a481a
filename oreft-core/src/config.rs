//! Platform-wide configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static platform configuration, loaded once at startup and shared by
/// every service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL that referral tracking links point at.
    pub base_url: String,
    /// Fraction of each payout withheld by the platform.
    pub platform_fee_rate: Decimal,
    /// Commission rate applied when a business registers without one.
    pub default_commission_rate: Decimal,
    /// Minimum pending balance required for a payout, unless the business
    /// overrides it.
    pub default_min_payout: Decimal,
    /// Days a commission is held before it is eligible for payout.
    pub default_payout_hold_days: u32,
    /// Hard deadline on a single gateway transfer call.
    #[serde(with = "duration_seconds")]
    pub transfer_timeout: Duration,
    /// Attempts at generating a unique referral code before giving up.
    pub max_code_attempts: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://example.com".to_string(),
            platform_fee_rate: Decimal::new(3, 2),
            default_commission_rate: Decimal::new(10, 2),
            default_min_payout: Decimal::new(25, 0),
            default_payout_hold_days: 30,
            transfer_timeout: Duration::from_secs(30),
            max_code_attempts: 10,
        }
    }
}

/// Serialize a [`Duration`] as whole seconds.
mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
