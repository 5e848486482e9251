//! # Rentbill Hetzner Cloud Gateway
//!
//! [`HcloudGateway`] implements the resource control gateway over the
//! Hetzner Cloud REST API (`/v1/servers`).
//!
//! Failures are classified for the scheduler: network errors, timeouts,
//! `429` and `5xx` are transient; other `4xx` responses are permanent.
//! Deleting a server that no longer exists succeeds.

pub mod client;
pub mod metrics;

pub use client::{HcloudGateway, DEFAULT_BASE_URL};
pub use metrics::sum_network_out;
