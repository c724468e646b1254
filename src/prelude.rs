//! Prelude module for convenient imports.
//!
//! This module re-exports the types most applications need, providing a
//! convenient way to import the frequently used items.
//!
//! # Usage
//!
//! ```ignore
//! use wonderpush::prelude::*;
//! ```
//!
//! This will import:
//! - The client facade (WonderPushClient) and its configuration (ClientConfig)
//! - Request building types (Request, RequestParams, HttpMethod)
//! - Error types (ApiError, ApiResult)
//! - Extension traits (ParamsDecorator, RequestOutbox, TimeSyncObserver,
//!   ServerPropertiesListener)

// Client facade and configuration
pub use crate::client::WonderPushClient;
pub use crate::config::{ClientConfig, DEFAULT_BASE_URL, SDK_VERSION};

// Request building
pub use crate::request::{HttpMethod, Request, RequestParams};

// Errors
pub use crate::error::{
    ApiError, ApiResult, ERROR_INVALID_ACCESS_TOKEN, ERROR_INVALID_CREDENTIALS,
};

// Session state
pub use crate::credentials::Session;
pub use crate::network::NetworkStatus;

// Extension traits
pub use crate::traits::{
    DefaultParamsDecorator, ParamsDecorator, RequestOutbox, ServerPropertiesListener,
    TimeSyncObserver,
};
