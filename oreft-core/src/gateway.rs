//! Payment-gateway collaborator interface.
//!
//! The concrete HTTP client for the gateway lives outside this crate; the
//! services here only depend on this trait. Tests use hand-rolled fakes.

use rust_decimal::Decimal;
use url::Url;

use crate::error::{ClassifiedError, ErrorKind};

/// Errors surfaced by a gateway call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The gateway processed the request and said no.
    #[error("gateway rejected the request: {message}")]
    Rejected { message: String },
    /// The call exceeded the configured transfer deadline.
    #[error("gateway call timed out after {seconds}s")]
    Timeout { seconds: u64 },
    /// Transport-level failure before the gateway answered.
    #[error("gateway unavailable: {message}")]
    Unavailable { message: String },
}

impl ClassifiedError for GatewayError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Gateway
    }
}

/// Result of an accepted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: String,
}

/// The payment operations this service needs from its gateway.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a destination account for a payee, returning its id.
    async fn create_destination_account(
        &self,
        email: &str,
        name: &str,
    ) -> Result<String, GatewayError>;

    /// Create an onboarding link for a destination account.
    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &Url,
        return_url: &Url,
    ) -> Result<Url, GatewayError>;

    /// Move `net_amount` to a destination account.
    ///
    /// `idempotency_tag` is stable per payout record so a retried call
    /// cannot double-transfer.
    async fn transfer(
        &self,
        net_amount: Decimal,
        destination_account_id: &str,
        idempotency_tag: &str,
    ) -> Result<TransferReceipt, GatewayError>;
}
