//! Request and response bodies of the authentication endpoints.

use serde::{Deserialize, Serialize};

use super::User;

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

/// Access token body returned by sign-in and refresh.
///
/// Deployments disagree on the field name, so all known spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    #[serde(alias = "accessToken", alias = "access_token", alias = "token")]
    pub access: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInResponse {
    pub user: User,
    pub token: AccessToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}
