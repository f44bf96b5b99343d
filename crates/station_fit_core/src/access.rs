//! crates/station_fit_core/src/access.rs
//!
//! Which roles may perform which mutation. The gateway checks this table before
//! touching the store; the backend enforces the same predicates on its own.

use std::fmt;

use crate::domain::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    EditOwnProfile,
    AssignRole,
    EditStandards,
    WriteCheckoffs,
    ManageChallenges,
    SubmitEntry,
    ModerateEntries,
    WriteRecord,
    ManageMessages,
    WriteSettings,
}

impl Action {
    pub fn required_roles(&self) -> &'static [Role] {
        match self {
            Action::EditOwnProfile | Action::SubmitEntry => &Role::ALL,
            Action::EditStandards
            | Action::WriteCheckoffs
            | Action::ModerateEntries
            | Action::ManageMessages => &Role::STAFF,
            Action::WriteRecord => &[Role::Admin, Role::Owner],
            Action::AssignRole | Action::ManageChallenges | Action::WriteSettings => &[Role::Owner],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::EditOwnProfile => "edit own profile",
            Action::AssignRole => "assign roles",
            Action::EditStandards => "edit standards",
            Action::WriteCheckoffs => "write checkoffs",
            Action::ManageChallenges => "manage challenges",
            Action::SubmitEntry => "submit entries",
            Action::ModerateEntries => "moderate entries",
            Action::WriteRecord => "write records",
            Action::ManageMessages => "manage messages",
            Action::WriteSettings => "write settings",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("role '{role}' may not {action}")]
pub struct AccessDenied {
    pub role: Role,
    pub action: Action,
}

pub fn is_allowed(role: Role, action: Action) -> bool {
    action.required_roles().contains(&role)
}

pub fn authorize(role: Role, action: Action) -> Result<(), AccessDenied> {
    if is_allowed(role, action) {
        Ok(())
    } else {
        Err(AccessDenied { role, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_actions() {
        assert!(authorize(Role::Mentor, Action::EditStandards).is_ok());
        assert!(authorize(Role::Member, Action::EditStandards).is_err());
        assert!(authorize(Role::Member, Action::SubmitEntry).is_ok());
    }

    #[test]
    fn owner_only_actions() {
        for role in [Role::Member, Role::Mentor, Role::Admin] {
            assert!(!is_allowed(role, Action::AssignRole));
            assert!(!is_allowed(role, Action::WriteSettings));
        }
        assert!(is_allowed(Role::Owner, Action::AssignRole));
        assert!(!is_allowed(Role::Mentor, Action::WriteRecord));
        assert!(is_allowed(Role::Admin, Action::WriteRecord));
    }

    #[test]
    fn denial_names_role_and_action() {
        let denied = authorize(Role::Member, Action::AssignRole).unwrap_err();
        assert_eq!(denied.to_string(), "role 'member' may not assign roles");
    }
}
