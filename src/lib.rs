//! WonderPush client SDK - authenticated API access and installation sync
//!
//! Acquires anonymous access tokens, signs and dispatches API requests, and
//! keeps installation custom properties synchronized with the server.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod json;
pub mod network;
pub mod prelude;
pub mod request;
pub mod session;
pub mod signer;
pub mod sync;
pub mod traits;
