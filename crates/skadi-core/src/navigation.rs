//! Application routes and the role-dependent personal-area tabs.

use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Main,
    SignIn,
    PersonalArea,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Main => "/",
            Route::SignIn => "/authorization",
            Route::PersonalArea => "/personal-area",
        }
    }

    /// Routes that require a signed-in user
    pub fn is_protected(&self) -> bool {
        matches!(self, Route::PersonalArea)
    }
}

/// Tabs shown in the personal area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalAreaTab {
    RoleManagement,
}

impl PersonalAreaTab {
    pub fn title(&self) -> &'static str {
        match self {
            PersonalAreaTab::RoleManagement => "Role management",
        }
    }

    /// Role allowed to see this tab
    pub fn role(&self) -> Role {
        match self {
            PersonalAreaTab::RoleManagement => Role::Admin,
        }
    }
}

const ALL_TABS: [PersonalAreaTab; 1] = [PersonalAreaTab::RoleManagement];

pub fn tabs_for_role(role: Role) -> Vec<PersonalAreaTab> {
    ALL_TABS.iter().copied().filter(|tab| tab.role() == role).collect()
}
