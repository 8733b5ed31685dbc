//! Authentication state.
//!
//! This module provides:
//! - `CredentialStore`: the in-memory access token, authenticated flag and role
//! - `RefreshGate`: allows only one credential refresh in flight
//! - `Session`: on-disk persistence of the credential and refresh cookies
//!
//! Persisted sessions are discarded after the backend's 10 day refresh lifetime.

pub mod gate;
pub mod persisted;
pub mod store;

pub use gate::{RefreshGate, RefreshPermit};
pub use persisted::{capture_cookies, restore_cookies, Session, SessionData};
pub use store::{Credential, CredentialStore};
