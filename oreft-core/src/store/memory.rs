//! In-memory store.
//!
//! Backs tests and single-process deployments. One `RwLock` over the whole
//! dataset keeps every write (including its index maintenance) atomic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use compact_str::CompactString;
use oreft_sdk::objects::PayoutStatus;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError, constraints};
use crate::entities::business::Business;
use crate::entities::payout::Payout;
use crate::entities::referral::Referral;

#[derive(Default)]
struct Inner {
    businesses: HashMap<CompactString, Business>,
    /// Lowercased email -> business id.
    business_email_idx: HashMap<String, CompactString>,
    business_key_idx: HashMap<String, CompactString>,

    referrals: HashMap<Uuid, Referral>,
    /// Referral codes are unique across all businesses.
    referral_code_idx: HashMap<CompactString, Uuid>,
    referral_user_idx: HashMap<(CompactString, String), Uuid>,

    payouts: HashMap<Uuid, Payout>,
    payout_transfer_idx: HashMap<String, Uuid>,
    /// Referrals that currently have a `processing` payout.
    processing_by_referral: HashSet<Uuid>,
    /// Insertion order, for newest-first listings.
    payout_order: Vec<Uuid>,
}

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_business(&self, business: Business) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let email = business.email.to_lowercase();
        if inner.business_email_idx.contains_key(&email) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::BUSINESS_EMAIL,
            });
        }
        if inner.business_key_idx.contains_key(&business.api_key) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::BUSINESS_API_KEY,
            });
        }
        inner
            .business_email_idx
            .insert(email, business.business_id.clone());
        inner
            .business_key_idx
            .insert(business.api_key.clone(), business.business_id.clone());
        inner
            .businesses
            .insert(business.business_id.clone(), business);
        Ok(())
    }

    async fn business(&self, business_id: &str) -> Result<Business, StoreError> {
        let inner = self.inner.read().await;
        inner
            .businesses
            .get(business_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn business_by_api_key(&self, api_key: &str) -> Result<Business, StoreError> {
        let inner = self.inner.read().await;
        let id = inner.business_key_idx.get(api_key).ok_or(StoreError::NotFound)?;
        inner
            .businesses
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn business_by_email(&self, email: &str) -> Result<Option<Business>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .business_email_idx
            .get(&email.to_lowercase())
            .and_then(|id| inner.businesses.get(id))
            .cloned())
    }

    async fn update_business(&self, mut business: Business) -> Result<Business, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .businesses
            .get(&business.business_id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != business.version {
            return Err(StoreError::VersionConflict);
        }
        if stored.api_key != business.api_key {
            if inner.business_key_idx.contains_key(&business.api_key) {
                return Err(StoreError::UniqueViolation {
                    constraint: constraints::BUSINESS_API_KEY,
                });
            }
            let old_key = stored.api_key.clone();
            inner.business_key_idx.remove(&old_key);
            inner
                .business_key_idx
                .insert(business.api_key.clone(), business.business_id.clone());
        }
        business.version += 1;
        inner
            .businesses
            .insert(business.business_id.clone(), business.clone());
        Ok(business)
    }

    async fn insert_referral(&self, referral: Referral) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.referral_code_idx.contains_key(&referral.code) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::REFERRAL_CODE,
            });
        }
        let user_key = (referral.business_id.clone(), referral.user_id.clone());
        if inner.referral_user_idx.contains_key(&user_key) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::REFERRAL_USER,
            });
        }
        inner.referral_code_idx.insert(referral.code.clone(), referral.id);
        inner.referral_user_idx.insert(user_key, referral.id);
        inner.referrals.insert(referral.id, referral);
        Ok(())
    }

    async fn referral_by_id(&self, id: Uuid) -> Result<Referral, StoreError> {
        let inner = self.inner.read().await;
        inner.referrals.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn referral_by_code(
        &self,
        business_id: &str,
        code: &str,
    ) -> Result<Referral, StoreError> {
        let inner = self.inner.read().await;
        inner
            .referral_code_idx
            .get(code)
            .and_then(|id| inner.referrals.get(id))
            .filter(|r| r.business_id == business_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn referral_by_user(
        &self,
        business_id: &str,
        user_id: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let inner = self.inner.read().await;
        let key = (CompactString::from(business_id), user_id.to_string());
        Ok(inner
            .referral_user_idx
            .get(&key)
            .and_then(|id| inner.referrals.get(id))
            .cloned())
    }

    async fn referrals_for_business(&self, business_id: &str) -> Result<Vec<Referral>, StoreError> {
        let inner = self.inner.read().await;
        let mut referrals: Vec<Referral> = inner
            .referrals
            .values()
            .filter(|r| r.business_id == business_id)
            .cloned()
            .collect();
        referrals.sort_by_key(|r| (r.created_at, r.id));
        Ok(referrals)
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.referral_code_idx.contains_key(code))
    }

    async fn update_referral(&self, mut referral: Referral) -> Result<Referral, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.referrals.get(&referral.id).ok_or(StoreError::NotFound)?;
        if stored.version != referral.version {
            return Err(StoreError::VersionConflict);
        }
        referral.version += 1;
        inner.referrals.insert(referral.id, referral.clone());
        Ok(referral)
    }

    async fn insert_payout(&self, payout: Payout) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if payout.status == PayoutStatus::Processing
            && !inner.processing_by_referral.insert(payout.referral_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::PAYOUT_PROCESSING_PER_REFERRAL,
            });
        }
        if let Some(transfer_id) = &payout.transfer_id {
            inner.payout_transfer_idx.insert(transfer_id.clone(), payout.id);
        }
        inner.payout_order.push(payout.id);
        inner.payouts.insert(payout.id, payout);
        Ok(())
    }

    async fn payout(&self, id: Uuid) -> Result<Payout, StoreError> {
        let inner = self.inner.read().await;
        inner.payouts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn payout_by_transfer(&self, transfer_id: &str) -> Result<Option<Payout>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .payout_transfer_idx
            .get(transfer_id)
            .and_then(|id| inner.payouts.get(id))
            .cloned())
    }

    async fn payouts_for_business(
        &self,
        business_id: &str,
        limit: usize,
    ) -> Result<Vec<Payout>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .payout_order
            .iter()
            .rev()
            .filter_map(|id| inner.payouts.get(id))
            .filter(|p| p.business_id == business_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_payout(&self, mut payout: Payout) -> Result<Payout, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.payouts.get(&payout.id).ok_or(StoreError::NotFound)?;
        if stored.version != payout.version {
            return Err(StoreError::VersionConflict);
        }
        let left_processing =
            stored.status == PayoutStatus::Processing && payout.status != PayoutStatus::Processing;
        if left_processing {
            inner.processing_by_referral.remove(&payout.referral_id);
        }
        if let Some(transfer_id) = &payout.transfer_id {
            inner.payout_transfer_idx.insert(transfer_id.clone(), payout.id);
        }
        payout.version += 1;
        inner.payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }
}
