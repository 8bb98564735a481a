//! Persistence interface.
//!
//! Schema and query mechanics live behind this trait; the services only
//! depend on its semantics. Writes use optimistic concurrency: every
//! entity carries a `version` counter, and `update_*` rejects a write
//! whose version no longer matches the stored row. Callers re-read and
//! retry, bounded by [`MAX_CAS_RETRIES`].

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::business::Business;
use crate::entities::payout::Payout;
use crate::entities::referral::Referral;
use crate::error::{ClassifiedError, ErrorKind};

/// Upper bound on read-modify-write retries after version conflicts.
pub const MAX_CAS_RETRIES: u32 = 16;

/// Unique-constraint names reported in [`StoreError::UniqueViolation`].
pub mod constraints {
    pub const BUSINESS_EMAIL: &str = "business_email";
    pub const BUSINESS_API_KEY: &str = "business_api_key";
    pub const REFERRAL_CODE: &str = "referral_code";
    pub const REFERRAL_USER: &str = "referral_user";
    pub const PAYOUT_PROCESSING_PER_REFERRAL: &str = "payout_processing_per_referral";
}

/// Errors surfaced by the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("entity not found")]
    NotFound,
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: &'static str },
    #[error("version conflict")]
    VersionConflict,
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl ClassifiedError for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound => ErrorKind::NotFound,
            StoreError::UniqueViolation { .. } | StoreError::VersionConflict => ErrorKind::Conflict,
            StoreError::Backend(_) => ErrorKind::Internal,
        }
    }
}

/// Storage operations the services need.
///
/// `update_*` methods compare the incoming entity's `version` against the
/// stored one, fail with [`StoreError::VersionConflict`] on mismatch, and
/// otherwise persist the entity with `version + 1`, returning the stored
/// copy.
#[async_trait]
pub trait Store: Send + Sync {
    // Businesses. Email and API key are unique across all accounts.
    async fn insert_business(&self, business: Business) -> Result<(), StoreError>;
    async fn business(&self, business_id: &str) -> Result<Business, StoreError>;
    async fn business_by_api_key(&self, api_key: &str) -> Result<Business, StoreError>;
    async fn business_by_email(&self, email: &str) -> Result<Option<Business>, StoreError>;
    async fn update_business(&self, business: Business) -> Result<Business, StoreError>;

    // Referrals. Codes are unique globally; a (business, user) pair holds
    // at most one referral.
    async fn insert_referral(&self, referral: Referral) -> Result<(), StoreError>;
    async fn referral_by_id(&self, id: Uuid) -> Result<Referral, StoreError>;
    async fn referral_by_code(&self, business_id: &str, code: &str)
    -> Result<Referral, StoreError>;
    async fn referral_by_user(
        &self,
        business_id: &str,
        user_id: &str,
    ) -> Result<Option<Referral>, StoreError>;
    async fn referrals_for_business(&self, business_id: &str) -> Result<Vec<Referral>, StoreError>;
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError>;
    async fn update_referral(&self, referral: Referral) -> Result<Referral, StoreError>;

    // Payouts. At most one `processing` payout may exist per referral;
    // `insert_payout` enforces this.
    async fn insert_payout(&self, payout: Payout) -> Result<(), StoreError>;
    async fn payout(&self, id: Uuid) -> Result<Payout, StoreError>;
    async fn payout_by_transfer(&self, transfer_id: &str) -> Result<Option<Payout>, StoreError>;
    /// Most recent payouts of a business, newest first.
    async fn payouts_for_business(
        &self,
        business_id: &str,
        limit: usize,
    ) -> Result<Vec<Payout>, StoreError>;
    async fn update_payout(&self, payout: Payout) -> Result<Payout, StoreError>;
}
