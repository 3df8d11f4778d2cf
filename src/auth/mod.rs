//! Authentication building blocks.
//!
//! Everything in here is framework-free: pure policy, codecs, and
//! engines that the HTTP layer wires together. Store access goes
//! through the traits in [`crate::store`], so each piece tests against
//! the in-memory implementations.

pub mod csrf;
pub mod error;
pub mod ledger;
pub mod lockout;
pub mod password;
pub mod policy;
pub mod rate_limit;
pub mod secret;
pub mod session;
