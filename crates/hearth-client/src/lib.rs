//! Client layer for the Home Assistant WebSocket and REST APIs.
//!
//! Provides the persistent multiplexed command channel, the stateless query
//! channel, and the facade that tool operations depend on.

pub mod client;
pub mod error;
pub mod models;
pub mod rest;
pub mod ws;

pub use client::HassClient;
pub use error::HassError;
pub use models::{HassState, HassValidationResult};
pub use rest::HassRestClient;
pub use ws::{ConnectionState, HassWsClient};
