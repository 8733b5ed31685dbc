//! Sign-in and logout endpoints.
//!
//! These only talk to the server; the credential transitions around them
//! live in [`crate::session::SessionService`].

use crate::models::{SignInRequest, SignInResponse};

use super::{ApiError, ApiRequest, AuthPipeline};

impl AuthPipeline {
    /// Exchange username and password for an access token. The refresh
    /// cookie set by the server lands in the pipeline's cookie jar.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<SignInResponse, ApiError> {
        let body = SignInRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = ApiRequest::post(self.config().endpoints.sign_in.as_str())
            .json(&body)?
            .anonymous();
        self.send_json(&request).await
    }

    /// Invalidate the refresh token on the server
    pub async fn logout(&self) -> Result<(), ApiError> {
        let request = ApiRequest::post(self.config().endpoints.logout.as_str());
        self.send_empty(&request).await
    }
}
