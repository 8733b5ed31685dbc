//! skadi-core - client library for the skadi school management backend.
//!
//! The heart of the crate is the authenticated request pipeline
//! ([`api::AuthPipeline`]): it attaches the bearer token from the shared
//! [`auth::CredentialStore`], and on a 401 refreshes the token through the
//! [`auth::RefreshGate`] so concurrent failures cause a single refresh, then
//! retries the call once. Typed endpoints, models, route guarding and
//! configuration are built on top of it.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;
pub mod session;
pub mod utils;

pub use api::{ApiError, ApiRequest, ApiResponse, AuthHooks, AuthPipeline};
pub use auth::{Credential, CredentialStore, RefreshGate};
pub use config::Config;
pub use session::{Access, Navigation, RouteGuard, SessionService};
