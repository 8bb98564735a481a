pub mod business;
pub mod payout;
pub mod referral;
