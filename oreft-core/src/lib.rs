#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod payout;
pub mod registry;
pub mod store;
pub mod utils;
