//! SDK for Open Referral Tracker.
//!
//! This crate contains the wire-level objects exchanged with the tracker
//! backend (request/response payloads for every exposed operation) and the
//! signature primitive used to authenticate inbound payment-gateway events.
//!
//! The objects here are plain serde types with no behavior beyond
//! presentation helpers; all business logic lives in `oreft-core`.

pub mod objects;
pub mod signature;
