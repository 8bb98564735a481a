//! Business registry.
//!
//! Account lifecycle of the tenant businesses: registration, API-key
//! authentication and rotation, settings updates, payment-account
//! onboarding, and deactivation.

use std::sync::Arc;

use compact_str::CompactString;
use thiserror::Error;
use tracing::{info, warn};

use oreft_sdk::objects::business::{
    BusinessProfile, ConnectAccountRequest, ConnectAccountResponse, RegisterBusinessRequest,
    RegisterBusinessResponse, RotatedApiKey, UpdateSettingsRequest,
};
use oreft_sdk::objects::{PayoutSchedule, Plan};

use crate::config::PlatformConfig;
use crate::entities::business::{Business, BusinessSettings, BusinessStats};
use crate::error::{ClassifiedError, ErrorKind};
use crate::gateway::{GatewayError, PaymentGateway};
use crate::store::{MAX_CAS_RETRIES, Store, StoreError, constraints};
use crate::utils::{codegen, now_unix};

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a business with this email already exists")]
    DuplicateEmail,
    #[error("business not found")]
    NotFound,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClassifiedError for RegistryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateEmail => ErrorKind::Conflict,
            RegistryError::NotFound => ErrorKind::NotFound,
            RegistryError::InvalidApiKey => ErrorKind::Unauthorized,
            RegistryError::Gateway(e) => e.kind(),
            RegistryError::Store(e) => e.kind(),
        }
    }
}

/// Business account service.
pub struct BusinessRegistry {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    config: PlatformConfig,
}

impl BusinessRegistry {
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

    /// Register a new business account.
    ///
    /// The response is the only place the generated API key appears in
    /// cleartext besides rotation.
    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(
        &self,
        request: RegisterBusinessRequest,
    ) -> Result<RegisterBusinessResponse, RegistryError> {
        let email = request.email.trim().to_lowercase();
        if self.store.business_by_email(&email).await?.is_some() {
            return Err(RegistryError::DuplicateEmail);
        }

        let now = now_unix();
        let business = Business {
            business_id: CompactString::from(codegen::generate_business_id()),
            name: request.name,
            email,
            api_key: codegen::generate_api_key(),
            payout_account_id: None,
            default_commission_rate: request
                .default_commission_rate
                .unwrap_or(self.config.default_commission_rate),
            payout_schedule: request.payout_schedule.unwrap_or(PayoutSchedule::Monthly),
            webhook_url: request.webhook_url,
            settings: BusinessSettings {
                code_prefix: String::new(),
                min_payout_amount: self.config.default_min_payout,
                payout_hold_days: self.config.default_payout_hold_days,
            },
            stats: BusinessStats::default(),
            plan: Plan::Starter,
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        let response = RegisterBusinessResponse {
            business_id: business.business_id.clone(),
            name: business.name.clone(),
            email: business.email.clone(),
            api_key: business.api_key.clone(),
            default_commission_rate: business.default_commission_rate,
            payout_schedule: business.payout_schedule,
        };

        match self.store.insert_business(business).await {
            Ok(()) => {}
            // Lost an insert race on the email.
            Err(StoreError::UniqueViolation {
                constraint: constraints::BUSINESS_EMAIL,
            }) => return Err(RegistryError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        }

        info!(business_id = %response.business_id, "business registered");
        Ok(response)
    }

    /// Resolve an API key to its active business.
    pub async fn authenticate(&self, api_key: &str) -> Result<Business, RegistryError> {
        let business = match self.store.business_by_api_key(api_key).await {
            Ok(business) => business,
            Err(StoreError::NotFound) => return Err(RegistryError::InvalidApiKey),
            Err(e) => return Err(e.into()),
        };
        if !business.is_active {
            return Err(RegistryError::InvalidApiKey);
        }
        Ok(business)
    }

    /// Fetch the profile of a business.
    pub async fn profile(&self, business_id: &str) -> Result<BusinessProfile, RegistryError> {
        let business = self.lookup(business_id).await?;
        Ok(business.profile())
    }

    /// Apply a partial settings update.
    ///
    /// Top-level fields and nested settings fields that are present
    /// replace the stored value; absent fields are untouched.
    #[tracing::instrument(skip(self, request))]
    pub async fn update_settings(
        &self,
        business_id: &str,
        request: UpdateSettingsRequest,
    ) -> Result<BusinessProfile, RegistryError> {
        let updated = self
            .modify(business_id, |business| {
                if let Some(rate) = request.default_commission_rate {
                    business.default_commission_rate = rate;
                }
                if let Some(schedule) = request.payout_schedule {
                    business.payout_schedule = schedule;
                }
                if let Some(url) = request.webhook_url.clone() {
                    business.webhook_url = Some(url);
                }
                if let Some(patch) = &request.settings {
                    if let Some(prefix) = patch.code_prefix.clone() {
                        business.settings.code_prefix = prefix;
                    }
                    if let Some(minimum) = patch.min_payout_amount {
                        business.settings.min_payout_amount = minimum;
                    }
                    if let Some(days) = patch.payout_hold_days {
                        business.settings.payout_hold_days = days;
                    }
                }
            })
            .await?;
        Ok(updated.profile())
    }

    /// Replace the API key. The old key stops authenticating immediately.
    #[tracing::instrument(skip(self))]
    pub async fn rotate_api_key(&self, business_id: &str) -> Result<RotatedApiKey, RegistryError> {
        let updated = self
            .modify(business_id, |business| {
                business.api_key = codegen::generate_api_key();
            })
            .await?;
        info!(business_id, "api key rotated");
        Ok(RotatedApiKey {
            api_key: updated.api_key,
        })
    }

    /// Create (or reuse) the business's gateway destination account and
    /// return a fresh onboarding link.
    #[tracing::instrument(skip(self, request))]
    pub async fn connect_payment_account(
        &self,
        business_id: &str,
        request: ConnectAccountRequest,
    ) -> Result<ConnectAccountResponse, RegistryError> {
        let business = self.lookup(business_id).await?;

        let account_id = match business.payout_account_id.clone() {
            Some(id) => id,
            None => {
                let id = self
                    .gateway
                    .create_destination_account(&business.email, &business.name)
                    .await?;
                let candidate = id.clone();
                let updated = self
                    .modify(business_id, move |business| {
                        // Another task may have connected concurrently;
                        // the first stored account wins.
                        if business.payout_account_id.is_none() {
                            business.payout_account_id = Some(candidate.clone());
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

    /// Deactivate a business. Its API key stops authenticating; stored
    /// data is retained.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, business_id: &str) -> Result<(), RegistryError> {
        self.modify(business_id, |business| {
            business.is_active = false;
        })
        .await?;
        warn!(business_id, "business deactivated");
        Ok(())
    }

    async fn lookup(&self, business_id: &str) -> Result<Business, RegistryError> {
        match self.store.business(business_id).await {
            Ok(business) => Ok(business),
            Err(StoreError::NotFound) => Err(RegistryError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write with bounded retries on version conflicts.
    async fn modify(
        &self,
        business_id: &str,
        mutate: impl Fn(&mut Business),
    ) -> Result<Business, RegistryError> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut business = self.lookup(business_id).await?;
            mutate(&mut business);
            business.updated_at = now_unix();
            match self.store.update_business(business).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::VersionConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RegistryError::Store(StoreError::VersionConflict))
    }
}
