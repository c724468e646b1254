//! Extension seams of the request pipeline.
//!
//! This module provides trait-based abstractions for the points where host
//! applications plug into the client: parameter decoration before signing,
//! durable queueing of fire-and-forget requests, server clock observation,
//! and delivery of server-side installation state.
//!
//! # Traits
//!
//! - [`ParamsDecorator`] - enrich outgoing parameters before signing
//! - [`RequestOutbox`] - durable queue for requests that must eventually run
//! - [`TimeSyncObserver`] - observe server timestamps for clock alignment
//! - [`ServerPropertiesListener`] - receive server-held installation properties

pub mod decorator;
pub mod listener;
pub mod outbox;
pub mod time_sync;

pub use decorator::{DefaultParamsDecorator, ParamsDecorator};
pub use listener::ServerPropertiesListener;
pub use outbox::RequestOutbox;
pub use time_sync::TimeSyncObserver;
