#![forbid(unsafe_code)]

pub mod gatekeeper;
pub mod safe_call;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod fake;


#[cfg(test)]
mod store_tests;

pub use gatekeeper::{GatePolicy, Gatekeeper};
pub use safe_call::SafeCallPolicy;
pub use store::{EligibilityStore, SweepOptions};
pub use tracker::ThreadTracker;

/// Default minimum member tenure.
pub const DEFAULT_MIN_TENURE_DAYS: i64 = 30;
