//! REST API access for the skadi backend.
//!
//! All calls go through [`AuthPipeline`], which attaches the bearer token,
//! refreshes it on 401 (one refresh at a time) and retries once. Endpoint
//! wrappers for authentication, the current user and member administration
//! are implemented as methods on the pipeline.

pub mod auth;
pub mod error;
pub mod member;
pub mod pipeline;
pub mod request;
pub mod user;

pub use error::ApiError;
pub use pipeline::{AuthHooks, AuthPipeline};
pub use request::{ApiRequest, ApiResponse};
