//! Current-user endpoints.

use crate::models::{ChangePasswordRequest, Profile, UpdateProfileRequest, User};

use super::{ApiError, ApiRequest, AuthPipeline};

impl AuthPipeline {
    /// Identity query: who is signed in
    pub async fn fetch_me(&self) -> Result<User, ApiError> {
        let request = ApiRequest::get(self.config().endpoints.identity.as_str());
        self.send_json(&request).await
    }

    pub async fn update_my_profile(&self, profile: Profile) -> Result<User, ApiError> {
        let path = format!("{}/profile", self.config().endpoints.identity.trim_end_matches('/'));
        let request = ApiRequest::put(path).json(&UpdateProfileRequest { profile })?;
        self.send_json(&request).await
    }

    pub async fn change_my_password(&self, password: &str) -> Result<(), ApiError> {
        let path = format!("{}/password", self.config().endpoints.identity.trim_end_matches('/'));
        let request = ApiRequest::put(path).json(&ChangePasswordRequest {
            password: password.to_string(),
        })?;
        self.send_empty(&request).await
    }
}
