//! Member administration payloads and the create-member form.

use serde::Serialize;
use thiserror::Error;

use super::{Contact, Profile, Role, User};
use crate::utils::contains_ignore_case;

const MAX_USERNAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 40;
const MAX_FULLNAME_LENGTH: usize = 150;
const MAX_ADDRESS_LENGTH: usize = 255;
const MAX_PHONE_LENGTH: usize = 15;
const MAX_EMAIL_LENGTH: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CreateMemberRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub profile: Profile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UpdateProfileRequest {
    pub profile: Profile,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("password must be between 8 and 40 characters")]
    PasswordLength,

    #[error("{0} is not a valid email address")]
    InvalidEmail(String),

    #[error("members can only be created as teacher or student")]
    RoleNotAllowed,
}

/// Flat form data for creating a member, as typed into the create dialog.
/// Empty strings mean "not provided".
#[derive(Debug, Clone)]
pub struct MemberForm {
    pub fullname: String,
    pub role: Role,
    pub username: String,
    pub password: String,
    pub address: String,
    pub email: String,
    pub phone: String,
    pub parent_email: String,
    pub parent_phone: String,
    pub extra: String,
    pub class_id: Option<i64>,
}

impl Default for MemberForm {
    fn default() -> Self {
        Self {
            fullname: String::new(),
            role: Role::Student,
            username: String::new(),
            password: String::new(),
            address: String::new(),
            email: String::new(),
            phone: String::new(),
            parent_email: String::new(),
            parent_phone: String::new(),
            extra: String::new(),
            class_id: None,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn build_contact(email: &str, phone: &str) -> Option<Contact> {
    if email.trim().is_empty() && phone.trim().is_empty() {
        None
    } else {
        Some(Contact {
            email: email.trim().to_string(),
            phone: phone.trim().to_string(),
        })
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), FormError> {
    if value.chars().count() > max {
        Err(FormError::TooLong { field, max })
    } else {
        Ok(())
    }
}

fn check_contact(prefix: &'static str, contact: &Contact) -> Result<(), FormError> {
    check_len(prefix, &contact.phone, MAX_PHONE_LENGTH)?;
    check_len(prefix, &contact.email, MAX_EMAIL_LENGTH)?;
    if !contact.email.is_empty() && !contact.email.contains('@') {
        return Err(FormError::InvalidEmail(contact.email.clone()));
    }
    Ok(())
}

impl MemberForm {
    /// Validate against the backend's limits and build the create request.
    pub fn into_request(self) -> Result<CreateMemberRequest, FormError> {
        if self.role == Role::Admin {
            return Err(FormError::RoleNotAllowed);
        }

        let username = non_empty(&self.username).ok_or(FormError::Missing("username"))?;
        check_len("username", &username, MAX_USERNAME_LENGTH)?;

        let password_len = self.password.chars().count();
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password_len) {
            return Err(FormError::PasswordLength);
        }

        let fullname = non_empty(&self.fullname).ok_or(FormError::Missing("fullname"))?;
        check_len("fullname", &fullname, MAX_FULLNAME_LENGTH)?;

        let address = non_empty(&self.address);
        if let Some(ref address) = address {
            check_len("address", address, MAX_ADDRESS_LENGTH)?;
        }

        let contact = build_contact(&self.email, &self.phone);
        if let Some(ref c) = contact {
            check_contact("contact", c)?;
        }
        let parent_contact = build_contact(&self.parent_email, &self.parent_phone);
        if let Some(ref c) = parent_contact {
            check_contact("parent contact", c)?;
        }

        Ok(CreateMemberRequest {
            username,
            password: self.password,
            role: self.role,
            profile: Profile {
                id: None,
                fullname,
                address,
                extra: non_empty(&self.extra),
                contact,
                parent_contact,
            },
            class_id: self.class_id,
        })
    }
}

/// Filter members by a free-text query over username and full name, and
/// optionally by role.
pub fn filter_members<'a>(members: &'a [User], query: &str, role: Option<Role>) -> Vec<&'a User> {
    let query = query.trim();
    members
        .iter()
        .filter(|m| role.map_or(true, |r| m.role == r))
        .filter(|m| {
            query.is_empty()
                || contains_ignore_case(&m.username, query)
                || m.profile
                    .as_ref()
                    .is_some_and(|p| contains_ignore_case(&p.fullname, query))
        })
        .collect()
}
