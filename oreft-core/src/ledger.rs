//! Referral ledger.
//!
//! The bookkeeping heart of the platform: issues referral codes, records
//! tracked events, accrues commissions into per-referral earnings, and
//! serves per-code and per-business statistics.

use std::sync::Arc;

use compact_str::CompactString;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use oreft_sdk::objects::dashboard::{
    DashboardResponse, DashboardSummary, RecentConversion, TopReferrer,
};
use oreft_sdk::objects::referral::{
    ConversionView, CreateReferralRequest, CreateReferralResponse, ReferralStatsResponse,
    ReferrerSummary, ShareLinks, TrackEventRequest, TrackEventResponse, tracking_url,
};
use oreft_sdk::objects::{ConversionStatus, EventKind};

use crate::config::PlatformConfig;
use crate::entities::business::Business;
use crate::entities::referral::{ConversionRecord, Referral};
use crate::error::{ClassifiedError, ErrorKind};
use crate::store::{MAX_CAS_RETRIES, Store, StoreError, constraints};
use crate::utils::{codegen, now_unix};

/// How many top conversions a stats response carries.
const TOP_CONVERSIONS: usize = 10;
/// Leaderboard size on the dashboard.
const TOP_REFERRERS: usize = 10;
/// Recent-conversion feed size on the dashboard.
const RECENT_CONVERSIONS: usize = 20;
/// Recent-payout feed size on the dashboard.
const RECENT_PAYOUTS: usize = 10;

/// Errors surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("business not found")]
    BusinessNotFound,
    #[error("referral code not found")]
    CodeNotFound,
    #[error("could not generate a unique referral code")]
    CodeGeneration,
    #[error("event type '{event_type}' requires a positive amount")]
    MissingAmount { event_type: EventKind },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClassifiedError for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::BusinessNotFound | LedgerError::CodeNotFound => ErrorKind::NotFound,
            LedgerError::CodeGeneration => ErrorKind::Internal,
            LedgerError::MissingAmount { .. } => ErrorKind::InvalidArgument,
            LedgerError::Store(e) => e.kind(),
        }
    }
}

/// Referral bookkeeping service.
pub struct ReferralLedger {
    store: Arc<dyn Store>,
    config: PlatformConfig,
}

impl ReferralLedger {
    pub fn new(store: Arc<dyn Store>, config: PlatformConfig) -> Self {
        Self { store, config }
    }

    /// Issue a referral code for a user, or return the one they already
    /// have. One code per (business, user) pair.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_referral(
        &self,
        business_id: &str,
        request: CreateReferralRequest,
    ) -> Result<CreateReferralResponse, LedgerError> {
        let business = self.business(business_id).await?;

        if let Some(existing) = self
            .store
            .referral_by_user(business_id, &request.user_id)
            .await?
        {
            return Ok(self.referral_response(&business, &existing, true));
        }

        let commission_rate = request
            .commission_rate
            .unwrap_or(business.default_commission_rate);
        let now = now_unix();

        for _ in 0..self.config.max_code_attempts {
            let code = CompactString::from(codegen::generate_referral_code(
                &request.name,
                &business.settings.code_prefix,
            ));
            if self.store.code_exists(&code).await? {
                continue;
            }
            let referral = Referral {
                id: Uuid::new_v4(),
                business_id: business.business_id.clone(),
                user_id: request.user_id.clone(),
                code: code.clone(),
                email: request.email.clone(),
                name: request.name.clone(),
                commission_rate,
                payout_account_id: None,
                stats: Default::default(),
                earnings: Default::default(),
                conversions: Vec::new(),
                is_active: true,
                created_at: now,
                updated_at: now,
                version: 0,
            };
            match self.store.insert_referral(referral.clone()).await {
                Ok(()) => {
                    self.modify_business(business_id, |b| {
                        b.stats.total_referrals += 1;
                    })
                    .await?;
                    info!(code = %code, "referral code issued");
                    return Ok(self.referral_response(&business, &referral, false));
                }
                // Lost the code to a concurrent insert; draw again.
                Err(StoreError::UniqueViolation {
                    constraint: constraints::REFERRAL_CODE,
                }) => continue,
                // Lost an insert race on the user; hand back theirs.
                Err(StoreError::UniqueViolation {
                    constraint: constraints::REFERRAL_USER,
                }) => {
                    let existing = self
                        .store
                        .referral_by_user(business_id, &request.user_id)
                        .await?
                        .ok_or(LedgerError::CodeNotFound)?;
                    return Ok(self.referral_response(&business, &existing, true));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::CodeGeneration)
    }

    /// Record a tracked event against a referral code.
    ///
    /// Clicks and signups bump counters; purchases and subscriptions
    /// additionally require a positive amount and accrue
    /// `amount * commission_rate` into pending earnings.
    #[tracing::instrument(skip(self, request), fields(code = %request.code, event = %request.event_type))]
    pub async fn record_event(
        &self,
        business_id: &str,
        request: TrackEventRequest,
    ) -> Result<TrackEventResponse, LedgerError> {
        let code = request.code.trim().to_uppercase();
        let amount = match (request.event_type.is_conversion(), request.amount) {
            (false, _) => None,
            (true, Some(amount)) if amount > Decimal::ZERO => Some(amount),
            (true, _) => {
                return Err(LedgerError::MissingAmount {
                    event_type: request.event_type,
                });
            }
        };

        let mut commission = Decimal::ZERO;
        let mut updated = None;
        for _ in 0..MAX_CAS_RETRIES {
            let mut referral = match self.store.referral_by_code(business_id, &code).await {
                Ok(r) if r.is_active => r,
                Ok(_) | Err(StoreError::NotFound) => return Err(LedgerError::CodeNotFound),
                Err(e) => return Err(e.into()),
            };
            let now = now_unix();
            commission = Decimal::ZERO;
            match request.event_type {
                EventKind::Click => referral.stats.clicks += 1,
                EventKind::Signup => referral.stats.signups += 1,
                EventKind::Purchase | EventKind::Subscription => {
                    // Checked above.
                    let amount = amount.ok_or(LedgerError::MissingAmount {
                        event_type: request.event_type,
                    })?;
                    commission = amount * referral.commission_rate;
                    referral.stats.conversions += 1;
                    referral.earnings.credit(commission);
                    referral.conversions.push(ConversionRecord {
                        date: now,
                        order_id: request
                            .order_id
                            .clone()
                            .unwrap_or_else(|| format!("order_{now}")),
                        amount,
                        commission,
                        product: request
                            .metadata
                            .as_ref()
                            .and_then(|m| m.get("product"))
                            .and_then(|p| p.as_str())
                            .unwrap_or("Unknown")
                            .to_string(),
                        status: ConversionStatus::Pending,
                    });
                }
            }
            referral.updated_at = now;
            match self.store.update_referral(referral).await {
                Ok(stored) => {
                    updated = Some(stored);
                    break;
                }
                Err(StoreError::VersionConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let referral = updated.ok_or(LedgerError::Store(StoreError::VersionConflict))?;

        let business = if let Some(amount) = amount {
            self.modify_business(business_id, |b| {
                b.stats.total_revenue += amount;
            })
            .await?
        } else {
            self.business(business_id).await?
        };

        debug!(commission = %commission, "event recorded");
        Ok(TrackEventResponse {
            commission_earned: commission,
            referrer: ReferrerSummary {
                name: referral.name.clone(),
                total_earnings: referral.earnings.total,
                lifetime_referrals: referral.stats.conversions,
            },
            payout_scheduled: business.next_payout_date(time::OffsetDateTime::now_utc().date()),
        })
    }

    /// Per-code statistics: counters, earnings, and the largest
    /// conversions.
    pub async fn referral_stats(
        &self,
        business_id: &str,
        code: &str,
    ) -> Result<ReferralStatsResponse, LedgerError> {
        let code = code.trim().to_uppercase();
        let referral = match self.store.referral_by_code(business_id, &code).await {
            Ok(r) => r,
            Err(StoreError::NotFound) => return Err(LedgerError::CodeNotFound),
            Err(e) => return Err(e.into()),
        };

        let mut top: Vec<&ConversionRecord> = referral.conversions.iter().collect();
        top.sort_by(|a, b| b.amount.cmp(&a.amount));

        Ok(ReferralStatsResponse {
            code: referral.code.clone(),
            clicks: referral.stats.clicks,
            signups: referral.stats.signups,
            conversions: referral.stats.conversions,
            conversion_rate: percentage(referral.stats.conversions, referral.stats.clicks, 1),
            earnings: referral.earnings.view(),
            top_referrals: top
                .into_iter()
                .take(TOP_CONVERSIONS)
                .map(conversion_view)
                .collect(),
        })
    }

    /// Business-wide dashboard: aggregate totals, leaderboard, and the
    /// most recent conversions and payouts.
    pub async fn dashboard(&self, business_id: &str) -> Result<DashboardResponse, LedgerError> {
        let business = self.business(business_id).await?;
        let referrals = self.store.referrals_for_business(business_id).await?;

        let total_clicks: u64 = referrals.iter().map(|r| r.stats.clicks).sum();
        let total_signups: u64 = referrals.iter().map(|r| r.stats.signups).sum();
        let total_conversions: u64 = referrals.iter().map(|r| r.stats.conversions).sum();
        let total_revenue: Decimal = referrals
            .iter()
            .flat_map(|r| &r.conversions)
            .map(|c| c.amount)
            .sum();
        let commissions_pending: Decimal = referrals.iter().map(|r| r.earnings.pending).sum();
        let commissions_paid: Decimal = referrals.iter().map(|r| r.earnings.paid).sum();
        let total_commissions: Decimal = referrals.iter().map(|r| r.earnings.total).sum();

        let avg_order_value = if total_conversions == 0 {
            Decimal::ZERO
        } else {
            (total_revenue / Decimal::from(total_conversions)).round_dp(2)
        };

        let mut by_earnings: Vec<&Referral> = referrals.iter().collect();
        by_earnings.sort_by(|a, b| b.earnings.total.cmp(&a.earnings.total));
        let top_referrers = by_earnings
            .into_iter()
            .take(TOP_REFERRERS)
            .map(|r| TopReferrer {
                code: r.code.clone(),
                name: r.name.clone(),
                conversions: r.stats.conversions,
                revenue: r.conversions.iter().map(|c| c.amount).sum(),
                earnings: r.earnings.total,
            })
            .collect();

        let mut recent: Vec<RecentConversion> = referrals
            .iter()
            .flat_map(|r| {
                r.conversions.iter().map(|c| RecentConversion {
                    referrer_code: r.code.clone(),
                    referrer_name: r.name.clone(),
                    date: c.date,
                    order_id: c.order_id.clone(),
                    amount: c.amount,
                    commission: c.commission,
                    product: c.product.clone(),
                    status: c.status,
                })
            })
            .collect();
        recent.sort_by(|a, b| b.date.cmp(&a.date));
        recent.truncate(RECENT_CONVERSIONS);

        let recent_payouts = self
            .store
            .payouts_for_business(business_id, RECENT_PAYOUTS)
            .await?
            .iter()
            .map(|p| p.receipt())
            .collect();

        Ok(DashboardResponse {
            business_id: business.business_id.clone(),
            business_name: business.name.clone(),
            summary: DashboardSummary {
                total_referrers: referrals.len() as u64,
                active_referrers: referrals.iter().filter(|r| r.stats.conversions > 0).count()
                    as u64,
                total_clicks,
                total_signups,
                total_conversions,
                conversion_rate: percentage(total_conversions, total_clicks, 2),
                total_revenue,
                avg_order_value,
                commissions_pending,
                commissions_paid,
                total_commissions,
            },
            top_referrers,
            recent_conversions: recent,
            recent_payouts,
        })
    }

    fn referral_response(
        &self,
        business: &Business,
        referral: &Referral,
        existing: bool,
    ) -> CreateReferralResponse {
        CreateReferralResponse {
            code: referral.code.clone(),
            tracking_url: tracking_url(&self.config.base_url, &referral.code),
            share_links: ShareLinks::for_code(&referral.code, &business.name),
            existing,
        }
    }

    async fn business(&self, business_id: &str) -> Result<Business, LedgerError> {
        match self.store.business(business_id).await {
            Ok(business) => Ok(business),
            Err(StoreError::NotFound) => Err(LedgerError::BusinessNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn modify_business(
        &self,
        business_id: &str,
        mutate: impl Fn(&mut Business),
    ) -> Result<Business, LedgerError> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut business = self.business(business_id).await?;
            mutate(&mut business);
            business.updated_at = now_unix();
            match self.store.update_business(business).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::VersionConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Store(StoreError::VersionConflict))
    }
}

/// `numerator / denominator` as a percentage, zero when the denominator
/// is zero.
fn percentage(numerator: u64, denominator: u64, decimals: u32) -> Decimal {
    if denominator == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(numerator) / Decimal::from(denominator) * Decimal::ONE_HUNDRED)
        .round_dp(decimals)
}

fn conversion_view(record: &ConversionRecord) -> ConversionView {
    ConversionView {
        date: record.date,
        order_id: record.order_id.clone(),
        amount: record.amount,
        commission: record.commission,
        product: record.product.clone(),
        status: record.status,
    }
}
