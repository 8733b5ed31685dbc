//! Member administration endpoints (admin only).

use crate::models::{ChangePasswordRequest, CreateMemberRequest, Profile, UpdateProfileRequest, User};

use super::{ApiError, ApiRequest, AuthPipeline};

const MEMBERS_PATH: &str = "/admin/user";

fn member_path(id: i64) -> String {
    format!("{}/{}", MEMBERS_PATH, id)
}

impl AuthPipeline {
    pub async fn fetch_members(&self) -> Result<Vec<User>, ApiError> {
        self.send_json(&ApiRequest::get(MEMBERS_PATH)).await
    }

    pub async fn fetch_member(&self, id: i64) -> Result<User, ApiError> {
        self.send_json(&ApiRequest::get(member_path(id))).await
    }

    pub async fn create_member(&self, member: &CreateMemberRequest) -> Result<User, ApiError> {
        let request = ApiRequest::post(MEMBERS_PATH).json(member)?;
        self.send_json(&request).await
    }

    pub async fn update_member_profile(&self, id: i64, profile: Profile) -> Result<User, ApiError> {
        let request = ApiRequest::put(format!("{}/profile", member_path(id)))
            .json(&UpdateProfileRequest { profile })?;
        self.send_json(&request).await
    }

    pub async fn change_member_password(&self, id: i64, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::put(format!("{}/password", member_path(id))).json(
            &ChangePasswordRequest {
                password: password.to_string(),
            },
        )?;
        self.send_empty(&request).await
    }

    pub async fn delete_member(&self, id: i64) -> Result<(), ApiError> {
        self.send_empty(&ApiRequest::delete(member_path(id))).await
    }
}
