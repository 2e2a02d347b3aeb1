use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Privilege level of an identity.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Voter,
    Admin,
}

impl Role {
    /// Is this role in the allowed-role set of the given operation?
    pub fn permits(self, operation: Operation) -> bool {
        operation.allowed_roles().contains(&self)
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// Operations gated by role.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operation {
    /// Cast votes and inspect one's own voting record.
    CastVote,
    /// Toggle voting, manage categories and candidates, read tallies.
    Administer,
}

impl Operation {
    /// The roles allowed to perform this operation.
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            // Admins are not excluded from voting; only the client restricts them.
            Self::CastVote => &[Role::Voter, Role::Admin],
            Self::Administer => &[Role::Admin],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_role_sets() {
        assert!(Role::Voter.permits(Operation::CastVote));
        assert!(Role::Admin.permits(Operation::CastVote));
        assert!(!Role::Voter.permits(Operation::Administer));
        assert!(Role::Admin.permits(Operation::Administer));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = rocket::serde::json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        assert_eq!(Role::default(), Role::Voter);
    }
}
