//! CRM REST integration.
//!
//! This crate owns everything that talks to the CRM account:
//! - **Client** (`client`) - lead list/update/merge, contact merge and
//!   pipeline list over the v4 REST API, implementing the core
//!   `CrmGateway` trait
//! - **OAuth** (`oauth`) - token manager holding the access/refresh
//!   pair in process memory, refreshing before expiry and exchanging
//!   authorization codes from the callback endpoint
//! - **Wire types** (`types`) - serde payloads for the `_embedded`
//!   response envelopes and their conversions into domain types

pub mod client;
pub mod oauth;
pub mod types;

pub use client::CrmClient;
pub use oauth::TokenManager;
