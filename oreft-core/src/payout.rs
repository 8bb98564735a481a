//! Payout engine.
//!
//! Drains a referral's pending earnings through the payment gateway. The
//! payout record is persisted in `processing` before the gateway is
//! called, so a crash mid-transfer leaves an auditable trail, and the
//! store refuses a second in-flight payout for the same referral.
//!
//! Money movement is gross-based: the full pending balance leaves the
//! ledger, the platform fee is absorbed out of it, and the net remainder
//! is what the gateway transfers.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use oreft_sdk::objects::business::{ConnectAccountRequest, ConnectAccountResponse};
use oreft_sdk::objects::payout::{InitiatePayoutRequest, PayoutReceipt};
use oreft_sdk::objects::{ConversionStatus, PayoutStatus};

use crate::config::PlatformConfig;
use crate::entities::payout::{InvalidTransition, Payout};
use crate::entities::referral::{InsufficientPending, Referral};
use crate::error::{ClassifiedError, ErrorKind};
use crate::gateway::{GatewayError, PaymentGateway};
use crate::store::{MAX_CAS_RETRIES, Store, StoreError, constraints};
use crate::utils::now_unix;

/// Errors surfaced by payout operations.
#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("referral code not found")]
    CodeNotFound,
    #[error("business not found")]
    BusinessNotFound,
    #[error("pending balance {pending} is below the payout minimum {minimum}")]
    BelowMinimum { minimum: Decimal, pending: Decimal },
    #[error("referral has no connected payout account")]
    NoPayoutDestination,
    #[error("a payout for this referral is already in flight")]
    PayoutInFlight,
    #[error("transfer failed for payout {payout_id}: {reason}")]
    TransferFailed { payout_id: Uuid, reason: String },
    #[error("payout {payout_id} completed but ledger settlement failed: {detail}")]
    NeedsReconciliation { payout_id: Uuid, detail: String },
    #[error(transparent)]
    Settlement(#[from] InsufficientPending),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClassifiedError for PayoutError {
    fn kind(&self) -> ErrorKind {
        match self {
            PayoutError::CodeNotFound | PayoutError::BusinessNotFound => ErrorKind::NotFound,
            PayoutError::BelowMinimum { .. } | PayoutError::NoPayoutDestination => {
                ErrorKind::PreconditionFailed
            }
            PayoutError::PayoutInFlight => ErrorKind::Conflict,
            PayoutError::TransferFailed { .. } => ErrorKind::Gateway,
            PayoutError::NeedsReconciliation { .. } | PayoutError::Settlement(_) => {
                ErrorKind::Internal
            }
            PayoutError::Gateway(e) => e.kind(),
            PayoutError::Store(e) => e.kind(),
        }
    }
}

/// Payout service.
pub struct PayoutEngine {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    config: PlatformConfig,
}

impl PayoutEngine {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Pay out the full pending balance of a referral.
    ///
    /// Validations (minimum balance, connected destination) happen before
    /// any record is written; a rejected request leaves no trace. A
    /// gateway failure or timeout leaves a `failed` payout record and the
    /// earnings untouched, so the balance stays claimable.
    #[tracing::instrument(skip(self, request), fields(code = %request.code))]
    pub async fn initiate_payout(
        &self,
        business_id: &str,
        request: InitiatePayoutRequest,
    ) -> Result<PayoutReceipt, PayoutError> {
        let code = request.code.trim().to_uppercase();
        let referral = match self.store.referral_by_code(business_id, &code).await {
            Ok(r) => r,
            Err(StoreError::NotFound) => return Err(PayoutError::CodeNotFound),
            Err(e) => return Err(e.into()),
        };
        let business = match self.store.business(business_id).await {
            Ok(b) => b,
            Err(StoreError::NotFound) => return Err(PayoutError::BusinessNotFound),
            Err(e) => return Err(e.into()),
        };

        let amount = referral.earnings.pending;
        let minimum = business.settings.min_payout_amount;
        if amount < minimum {
            return Err(PayoutError::BelowMinimum {
                minimum,
                pending: amount,
            });
        }
        let destination = referral
            .payout_account_id
            .clone()
            .ok_or(PayoutError::NoPayoutDestination)?;

        let platform_fee = (amount * self.config.platform_fee_rate).round_dp(2);
        let payout = Payout::new_processing(
            business.business_id.clone(),
            referral.id,
            referral.code.clone(),
            amount,
            platform_fee,
            now_unix(),
        );
        let payout_id = payout.id;
        let net_amount = payout.net_amount;

        match self.store.insert_payout(payout).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation {
                constraint: constraints::PAYOUT_PROCESSING_PER_REFERRAL,
            }) => return Err(PayoutError::PayoutInFlight),
            Err(e) => return Err(e.into()),
        }

        // Stable per payout record, so a retried call cannot
        // double-transfer at the gateway.
        let idempotency_tag = format!("payout_{payout_id}");
        let transfer = tokio::time::timeout(
            self.config.transfer_timeout,
            self.gateway
                .transfer(net_amount, &destination, &idempotency_tag),
        )
        .await;

        let receipt = match transfer {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(gateway_error)) => {
                let reason = gateway_error.to_string();
                error!(payout_id = %payout_id, reason, "gateway transfer failed");
                self.fail_payout(payout_id, reason.clone()).await?;
                return Err(PayoutError::TransferFailed { payout_id, reason });
            }
            Err(_) => {
                let reason = GatewayError::Timeout {
                    seconds: self.config.transfer_timeout.as_secs(),
                }
                .to_string();
                error!(payout_id = %payout_id, reason, "gateway transfer timed out");
                self.fail_payout(payout_id, reason.clone()).await?;
                return Err(PayoutError::TransferFailed { payout_id, reason });
            }
        };

        let (completed, applied) = self
            .modify_payout(payout_id, |payout| {
                payout.mark_completed(receipt.transfer_id.clone(), now_unix())
            })
            .await?;
        if !applied {
            // Another actor already finished this payout; the settlement
            // ran (or will run) there.
            return Ok(completed.receipt());
        }

        // The gateway has moved the money at this point. A settlement
        // failure here leaves a completed payout whose gross is still in
        // pending, so it must not pass as an ordinary store error.
        let settlement = match self.settle_referral(referral.id, amount).await {
            Ok(()) => self.credit_business_paid_total(business_id, amount).await,
            Err(e) => Err(e),
        };
        if let Err(e) = settlement {
            error!(
                payout_id = %payout_id,
                transfer_id = %receipt.transfer_id,
                error = %e,
                "payout completed at the gateway but ledger settlement failed; reconciliation required"
            );
            return Err(PayoutError::NeedsReconciliation {
                payout_id,
                detail: e.to_string(),
            });
        }

        info!(
            payout_id = %payout_id,
            transfer_id = %receipt.transfer_id,
            amount = %amount,
            net = %net_amount,
            "payout completed"
        );
        Ok(completed.receipt())
    }

    /// React to a gateway notification that a completed transfer was
    /// unwound: fail the payout and put the money back into pending.
    ///
    /// Unknown transfer ids and payouts not in `completed` are logged and
    /// ignored; gateway deliveries are at-least-once and may be stale.
    #[tracing::instrument(skip(self, reason))]
    pub async fn handle_transfer_reversal(
        &self,
        transfer_id: &str,
        reason: Option<String>,
    ) -> Result<(), PayoutError> {
        let payout = match self.store.payout_by_transfer(transfer_id).await? {
            Some(payout) => payout,
            None => {
                warn!(transfer_id, "reversal for unknown transfer ignored");
                return Ok(());
            }
        };
        if payout.status != PayoutStatus::Completed {
            warn!(
                transfer_id,
                status = %payout.status,
                "reversal for non-completed payout ignored"
            );
            return Ok(());
        }

        let reason = reason.unwrap_or_else(|| "transfer reversed by gateway".to_string());
        let (_, applied) = self
            .modify_payout(payout.id, |p| p.reverse(reason.clone(), now_unix()))
            .await?;
        if !applied {
            // A concurrent duplicate delivery won the reversal; the
            // restore ran on that path. Restoring again would double the
            // refund.
            warn!(transfer_id, "duplicate reversal delivery ignored");
            return Ok(());
        }

        self.modify_referral(payout.referral_id, |referral| {
            referral.earnings.restore(payout.amount);
        })
        .await?;

        warn!(
            payout_id = %payout.id,
            transfer_id,
            amount = %payout.amount,
            "payout reversed, earnings restored"
        );
        Ok(())
    }

    /// Create (or reuse) the gateway destination account for a referral
    /// and return a fresh onboarding link.
    #[tracing::instrument(skip(self, request))]
    pub async fn connect_payout_account(
        &self,
        business_id: &str,
        code: &str,
        request: ConnectAccountRequest,
    ) -> Result<ConnectAccountResponse, PayoutError> {
        let code = code.trim().to_uppercase();
        let referral = match self.store.referral_by_code(business_id, &code).await {
            Ok(r) => r,
            Err(StoreError::NotFound) => return Err(PayoutError::CodeNotFound),
            Err(e) => return Err(e.into()),
        };

        let account_id = match referral.payout_account_id.clone() {
            Some(id) => id,
            None => {
                let id = self
                    .gateway
                    .create_destination_account(&referral.email, &referral.name)
                    .await?;
                let candidate = id.clone();
                let updated = self
                    .modify_referral(referral.id, move |referral| {
                        // First stored account wins under concurrent
                        // connects.
                        if referral.payout_account_id.is_none() {
                            referral.payout_account_id = Some(candidate.clone());
                        }
                    })
                    .await?;
                updated.payout_account_id.unwrap_or(id)
            }
        };

        let onboarding_url = self
            .gateway
            .create_onboarding_link(&account_id, &request.refresh_url, &request.return_url)
            .await?;
        Ok(ConnectAccountResponse {
            onboarding_url,
            account_id,
        })
    }

    /// Most recent payouts of a business, newest first.
    pub async fn payout_history(
        &self,
        business_id: &str,
        limit: usize,
    ) -> Result<Vec<PayoutReceipt>, PayoutError> {
        Ok(self
            .store
            .payouts_for_business(business_id, limit)
            .await?
            .iter()
            .map(|p| p.receipt())
            .collect())
    }

    /// Settle a completed payout against the referral's earnings: pending
    /// drops by the gross amount, paid grows by it, and approved
    /// conversion records flip to paid.
    async fn settle_referral(&self, referral_id: Uuid, amount: Decimal) -> Result<(), PayoutError> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut referral = self.store.referral_by_id(referral_id).await?;
            referral.earnings.settle(amount)?;
            for record in &mut referral.conversions {
                if record.status == ConversionStatus::Approved {
                    record.status = ConversionStatus::Paid;
                }
            }
            referral.updated_at = now_unix();
            match self.store.update_referral(referral).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PayoutError::Store(StoreError::VersionConflict))
    }

    async fn credit_business_paid_total(
        &self,
        business_id: &str,
        amount: Decimal,
    ) -> Result<(), PayoutError> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut business = self.store.business(business_id).await?;
            business.stats.total_commissions_paid += amount;
            business.updated_at = now_unix();
            match self.store.update_business(business).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PayoutError::Store(StoreError::VersionConflict))
    }

    async fn fail_payout(&self, payout_id: Uuid, reason: String) -> Result<(), PayoutError> {
        self.modify_payout(payout_id, |payout| payout.mark_failed(reason.clone(), now_unix()))
            .await?;
        Ok(())
    }

    /// Read-modify-write of a payout with bounded retries on version
    /// conflicts.
    ///
    /// Returns the stored payout and whether the transition was applied
    /// by this call. A skipped transition (another actor already moved
    /// the payout to a state `mutate` rejects) is not an error, but the
    /// caller must not run the side effects that belong to the
    /// transition.
    async fn modify_payout(
        &self,
        payout_id: Uuid,
        mutate: impl Fn(&mut Payout) -> Result<(), InvalidTransition>,
    ) -> Result<(Payout, bool), PayoutError> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut payout = self.store.payout(payout_id).await?;
            if let Err(invalid) = mutate(&mut payout) {
                warn!(payout_id = %payout_id, %invalid, "payout transition skipped");
                return Ok((payout, false));
            }
            match self.store.update_payout(payout).await {
                Ok(stored) => return Ok((stored, true)),
                Err(StoreError::VersionConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PayoutError::Store(StoreError::VersionConflict))
    }

    async fn modify_referral(
        &self,
        referral_id: Uuid,
        mutate: impl Fn(&mut Referral),
    ) -> Result<Referral, PayoutError> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut referral = self.store.referral_by_id(referral_id).await?;
            mutate(&mut referral);
            referral.updated_at = now_unix();
            match self.store.update_referral(referral).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::VersionConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PayoutError::Store(StoreError::VersionConflict))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::entities::business::{Business, BusinessSettings, BusinessStats};
    use crate::entities::referral::ConversionRecord;
    use crate::gateway::TransferReceipt;
    use crate::store::memory::MemoryStore;
    use compact_str::CompactString;
    use oreft_sdk::objects::{PayoutSchedule, Plan};
    use std::sync::Mutex;
    use url::Url;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Reject,
        Hang,
    }

    struct TestGateway {
        behavior: Mutex<Behavior>,
        transfers: Mutex<Vec<(Decimal, String, String)>>,
    }

    impl TestGateway {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                transfers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PaymentGateway for TestGateway {
        async fn create_destination_account(
            &self,
            _email: &str,
            _name: &str,
        ) -> Result<String, GatewayError> {
            Ok("acct_ref_1".to_string())
        }

        async fn create_onboarding_link(
            &self,
            account_id: &str,
            _refresh_url: &Url,
            _return_url: &Url,
        ) -> Result<Url, GatewayError> {
            Ok(Url::parse(&format!("https://gateway.test/onboard/{account_id}")).unwrap())
        }

        async fn transfer(
            &self,
            net_amount: Decimal,
            destination_account_id: &str,
            idempotency_tag: &str,
        ) -> Result<TransferReceipt, GatewayError> {
            let behavior = *self.behavior.lock().unwrap();
            match behavior {
                Behavior::Succeed => {
                    self.transfers.lock().unwrap().push((
                        net_amount,
                        destination_account_id.to_string(),
                        idempotency_tag.to_string(),
                    ));
                    Ok(TransferReceipt {
                        transfer_id: format!("tr_{idempotency_tag}"),
                    })
                }
                Behavior::Reject => Err(GatewayError::Rejected {
                    message: "insufficient platform balance".to_string(),
                }),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    /// Store wrapper controlling failure timing: can rendezvous
    /// reversal lookups so two deliveries race, and can reject referral
    /// writes to simulate a backend outage mid-settlement.
    struct ProxyStore {
        inner: Arc<MemoryStore>,
        reversal_rendezvous: Option<Arc<tokio::sync::Barrier>>,
        fail_referral_updates: bool,
    }

    #[async_trait::async_trait]
    impl Store for ProxyStore {
        async fn insert_business(&self, business: Business) -> Result<(), StoreError> {
            self.inner.insert_business(business).await
        }

        async fn business(&self, business_id: &str) -> Result<Business, StoreError> {
            self.inner.business(business_id).await
        }

        async fn business_by_api_key(&self, api_key: &str) -> Result<Business, StoreError> {
            self.inner.business_by_api_key(api_key).await
        }

        async fn business_by_email(&self, email: &str) -> Result<Option<Business>, StoreError> {
            self.inner.business_by_email(email).await
        }

        async fn update_business(&self, business: Business) -> Result<Business, StoreError> {
            self.inner.update_business(business).await
        }

        async fn insert_referral(&self, referral: Referral) -> Result<(), StoreError> {
            self.inner.insert_referral(referral).await
        }

        async fn referral_by_id(&self, id: Uuid) -> Result<Referral, StoreError> {
            self.inner.referral_by_id(id).await
        }

        async fn referral_by_code(
            &self,
            business_id: &str,
            code: &str,
        ) -> Result<Referral, StoreError> {
            self.inner.referral_by_code(business_id, code).await
        }

        async fn referral_by_user(
            &self,
            business_id: &str,
            user_id: &str,
        ) -> Result<Option<Referral>, StoreError> {
            self.inner.referral_by_user(business_id, user_id).await
        }

        async fn referrals_for_business(
            &self,
            business_id: &str,
        ) -> Result<Vec<Referral>, StoreError> {
            self.inner.referrals_for_business(business_id).await
        }

        async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
            self.inner.code_exists(code).await
        }

        async fn update_referral(&self, referral: Referral) -> Result<Referral, StoreError> {
            if self.fail_referral_updates {
                return Err(StoreError::Backend("referral write rejected".to_string()));
            }
            self.inner.update_referral(referral).await
        }

        async fn insert_payout(&self, payout: Payout) -> Result<(), StoreError> {
            self.inner.insert_payout(payout).await
        }

        async fn payout(&self, id: Uuid) -> Result<Payout, StoreError> {
            self.inner.payout(id).await
        }

        async fn payout_by_transfer(
            &self,
            transfer_id: &str,
        ) -> Result<Option<Payout>, StoreError> {
            let payout = self.inner.payout_by_transfer(transfer_id).await;
            if let Some(barrier) = &self.reversal_rendezvous {
                barrier.wait().await;
            }
            payout
        }

        async fn payouts_for_business(
            &self,
            business_id: &str,
            limit: usize,
        ) -> Result<Vec<Payout>, StoreError> {
            self.inner.payouts_for_business(business_id, limit).await
        }

        async fn update_payout(&self, payout: Payout) -> Result<Payout, StoreError> {
            self.inner.update_payout(payout).await
        }
    }

    async fn seed_business(store: &Arc<MemoryStore>) -> CompactString {
        let business = Business {
            business_id: "biz_test00000001".into(),
            name: "Acme".to_string(),
            email: "ops@acme.test".to_string(),
            api_key: "oreft_test".to_string(),
            payout_account_id: None,
            default_commission_rate: dec("0.10"),
            payout_schedule: PayoutSchedule::Monthly,
            webhook_url: None,
            settings: BusinessSettings {
                code_prefix: String::new(),
                min_payout_amount: dec("25"),
                payout_hold_days: 30,
            },
            stats: BusinessStats::default(),
            plan: Plan::Starter,
            is_active: true,
            created_at: 0,
            updated_at: 0,
            version: 0,
        };
        let id = business.business_id.clone();
        store.insert_business(business).await.unwrap();
        id
    }

    async fn seed_referral(
        store: &Arc<MemoryStore>,
        business_id: &str,
        pending: Decimal,
        connected: bool,
    ) -> Referral {
        let mut referral = Referral {
            id: Uuid::new_v4(),
            business_id: business_id.into(),
            user_id: "user-1".to_string(),
            code: "JANE07".into(),
            email: "jane@example.test".to_string(),
            name: "Jane".to_string(),
            commission_rate: dec("0.10"),
            payout_account_id: connected.then(|| "acct_ref_1".to_string()),
            stats: Default::default(),
            earnings: Default::default(),
            conversions: Vec::new(),
            is_active: true,
            created_at: 0,
            updated_at: 0,
            version: 0,
        };
        if pending > Decimal::ZERO {
            referral.earnings.credit(pending);
            referral.conversions.push(ConversionRecord {
                date: 0,
                order_id: "order_1".to_string(),
                amount: pending * dec("10"),
                commission: pending,
                product: "Widget".to_string(),
                status: ConversionStatus::Approved,
            });
        }
        store.insert_referral(referral.clone()).await.unwrap();
        referral
    }

    fn engine(store: Arc<MemoryStore>, gateway: Arc<TestGateway>) -> PayoutEngine {
        PayoutEngine::new(store, gateway, PlatformConfig::default())
    }

    fn payout_request() -> InitiatePayoutRequest {
        InitiatePayoutRequest {
            code: "jane07".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_payout_settles_gross_and_transfers_net() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        let referral = seed_referral(&store, &business_id, dec("100"), true).await;
        let engine = engine(store.clone(), gateway.clone());

        let receipt = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap();
        assert_eq!(receipt.status, PayoutStatus::Completed);
        assert_eq!(receipt.amount, dec("100"));
        assert_eq!(receipt.platform_fee, dec("3.00"));
        assert_eq!(receipt.net_amount, dec("97.00"));
        assert!(receipt.transfer_id.is_some());

        // The gateway saw only the net amount.
        let transfers = gateway.transfers.lock().unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].0, dec("97.00"));
        assert_eq!(transfers[0].1, "acct_ref_1");
        assert_eq!(transfers[0].2, format!("payout_{}", receipt.id));
        drop(transfers);

        // The full gross amount left pending.
        let settled = store.referral_by_id(referral.id).await.unwrap();
        assert_eq!(settled.earnings.pending, Decimal::ZERO);
        assert_eq!(settled.earnings.paid, dec("100"));
        assert!(settled.earnings.is_balanced());
        assert_eq!(settled.conversions[0].status, ConversionStatus::Paid);

        let business = store.business(&business_id).await.unwrap();
        assert_eq!(business.stats.total_commissions_paid, dec("100"));
    }

    #[tokio::test]
    async fn below_minimum_leaves_no_record() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        seed_referral(&store, &business_id, dec("10"), true).await;
        let engine = engine(store.clone(), gateway);

        let err = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PayoutError::BelowMinimum { minimum, pending }
                if minimum == dec("25") && pending == dec("10")
        ));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(engine.payout_history(&business_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_destination_leaves_no_record() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        seed_referral(&store, &business_id, dec("100"), false).await;
        let engine = engine(store.clone(), gateway);

        let err = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PayoutError::NoPayoutDestination));
        assert!(engine.payout_history(&business_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_transfer_fails_the_payout_and_keeps_earnings() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Reject));
        let business_id = seed_business(&store).await;
        let referral = seed_referral(&store, &business_id, dec("100"), true).await;
        let engine = engine(store.clone(), gateway);

        let err = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap_err();
        let PayoutError::TransferFailed { payout_id, reason } = err else {
            panic!("expected TransferFailed, got {err:?}");
        };
        assert!(reason.contains("insufficient platform balance"));

        let payout = store.payout(payout_id).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Failed);
        assert_eq!(payout.failure_reason.as_deref(), Some(reason.as_str()));

        // The balance is still claimable.
        let untouched = store.referral_by_id(referral.id).await.unwrap();
        assert_eq!(untouched.earnings.pending, dec("100"));
        assert_eq!(untouched.earnings.paid, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_transfer_times_out_with_a_distinguishable_reason() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Hang));
        let business_id = seed_business(&store).await;
        seed_referral(&store, &business_id, dec("100"), true).await;
        let engine = engine(store.clone(), gateway);

        let err = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap_err();
        let PayoutError::TransferFailed { payout_id, reason } = err else {
            panic!("expected TransferFailed, got {err:?}");
        };
        assert!(reason.contains("timed out after 30s"));

        let payout = store.payout(payout_id).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn second_payout_while_one_is_in_flight_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Hang));
        let business_id = seed_business(&store).await;
        seed_referral(&store, &business_id, dec("100"), true).await;
        let engine = Arc::new(engine(store.clone(), gateway));

        let first = {
            let engine = engine.clone();
            let business_id = business_id.clone();
            tokio::spawn(async move { engine.initiate_payout(&business_id, payout_request()).await })
        };
        // Let the first call persist its processing record and block on
        // the gateway.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let err = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PayoutError::PayoutInFlight));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // The first call eventually times out and fails.
        let result = first.await.unwrap();
        assert!(matches!(result, Err(PayoutError::TransferFailed { .. })));
    }

    #[tokio::test]
    async fn reversal_restores_the_earnings() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        let referral = seed_referral(&store, &business_id, dec("100"), true).await;
        let engine = engine(store.clone(), gateway);

        let receipt = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap();
        let transfer_id = receipt.transfer_id.unwrap();

        engine
            .handle_transfer_reversal(&transfer_id, Some("account closed".to_string()))
            .await
            .unwrap();

        let payout = store.payout(receipt.id).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Failed);
        assert_eq!(payout.failure_reason.as_deref(), Some("account closed"));

        let restored = store.referral_by_id(referral.id).await.unwrap();
        assert_eq!(restored.earnings.pending, dec("100"));
        assert_eq!(restored.earnings.paid, Decimal::ZERO);
        assert!(restored.earnings.is_balanced());

        // A second delivery of the same reversal is a no-op.
        engine
            .handle_transfer_reversal(&transfer_id, None)
            .await
            .unwrap();
        let unchanged = store.referral_by_id(referral.id).await.unwrap();
        assert_eq!(unchanged.earnings.pending, dec("100"));
    }

    #[tokio::test]
    async fn concurrent_duplicate_reversals_restore_once() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        let referral = seed_referral(&store, &business_id, dec("100"), true).await;

        let receipt = engine(store.clone(), gateway.clone())
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap();
        let transfer_id = receipt.transfer_id.unwrap();

        // Both deliveries look up a completed payout before either one
        // writes the reversal.
        let proxy = Arc::new(ProxyStore {
            inner: store.clone(),
            reversal_rendezvous: Some(Arc::new(tokio::sync::Barrier::new(2))),
            fail_referral_updates: false,
        });
        let racing = Arc::new(PayoutEngine::new(proxy, gateway, PlatformConfig::default()));

        let mut deliveries = Vec::new();
        for _ in 0..2 {
            let racing = racing.clone();
            let transfer_id = transfer_id.clone();
            deliveries.push(tokio::spawn(async move {
                racing.handle_transfer_reversal(&transfer_id, None).await
            }));
        }
        for delivery in deliveries {
            delivery.await.unwrap().unwrap();
        }

        // Exactly one delivery applied the reversal and the restore.
        let restored = store.referral_by_id(referral.id).await.unwrap();
        assert_eq!(restored.earnings.pending, dec("100"));
        assert_eq!(restored.earnings.paid, Decimal::ZERO);
        assert!(restored.earnings.is_balanced());

        let payout = store.payout(receipt.id).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Failed);
    }

    #[tokio::test]
    async fn settlement_failure_after_completion_is_surfaced_for_reconciliation() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        let referral = seed_referral(&store, &business_id, dec("100"), true).await;

        let proxy = Arc::new(ProxyStore {
            inner: store.clone(),
            reversal_rendezvous: None,
            fail_referral_updates: true,
        });
        let engine = PayoutEngine::new(proxy, gateway, PlatformConfig::default());

        let err = engine
            .initiate_payout(&business_id, payout_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let PayoutError::NeedsReconciliation { payout_id, detail } = err else {
            panic!("expected NeedsReconciliation, got {err:?}");
        };
        assert!(detail.contains("referral write rejected"));

        // The transfer went out but the ledger did not settle: the
        // divergence is recorded, not silently dropped.
        let payout = store.payout(payout_id).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Completed);
        assert!(payout.transfer_id.is_some());

        let unsettled = store.referral_by_id(referral.id).await.unwrap();
        assert_eq!(unsettled.earnings.pending, dec("100"));
        assert_eq!(unsettled.earnings.paid, Decimal::ZERO);
    }

    #[tokio::test]
    async fn reversal_for_an_unknown_transfer_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        seed_referral(&store, &business_id, dec("100"), true).await;
        let engine = engine(store, gateway);

        engine
            .handle_transfer_reversal("tr_unknown", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_stores_the_destination_on_the_referral() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(TestGateway::new(Behavior::Succeed));
        let business_id = seed_business(&store).await;
        let referral = seed_referral(&store, &business_id, Decimal::ZERO, false).await;
        let engine = engine(store.clone(), gateway);

        let request = || ConnectAccountRequest {
            refresh_url: Url::parse("https://acme.test/retry").unwrap(),
            return_url: Url::parse("https://acme.test/done").unwrap(),
        };
        let first = engine
            .connect_payout_account(&business_id, "jane07", request())
            .await
            .unwrap();
        let second = engine
            .connect_payout_account(&business_id, "JANE07", request())
            .await
            .unwrap();
        assert_eq!(first.account_id, second.account_id);

        let connected = store.referral_by_id(referral.id).await.unwrap();
        assert_eq!(connected.payout_account_id, Some(first.account_id));
    }
}
