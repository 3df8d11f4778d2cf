//! User authentication and session security backend.
//!
//! The `auth` module holds the engine (policy, hashing, tokens,
//! lockout, rate limiting, CSRF); `store` defines the persistence
//! contracts with Postgres and in-memory implementations; `userauth`
//! is the axum service that glues them together behind HTTP.

pub mod auth;
pub mod cli;
pub mod email;
pub mod store;
pub mod userauth;
