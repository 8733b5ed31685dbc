//! Data models for skadi entities.
//!
//! - `User`, `Profile`, `Contact`, `Class`: people and classes
//! - `Role`: account role (admin, teacher, student)
//! - Auth payloads: `SignInRequest`, `SignInResponse`, `AccessToken`
//! - Member administration: `CreateMemberRequest`, `MemberForm`, `filter_members`

pub mod auth;
pub mod member;
pub mod user;

pub use auth::{AccessToken, ChangePasswordRequest, SignInRequest, SignInResponse};
pub use member::{filter_members, CreateMemberRequest, FormError, MemberForm, UpdateProfileRequest};
pub use user::{Class, Contact, Profile, Role, User};
