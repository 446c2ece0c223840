//! Role-based access policy.
//!
//! `evaluate` decides whether a caller may perform an action on a target, and
//! `filter_predicate` yields the row filter that scopes list and lookup queries.
//! Both are pure over the values passed in; services translate `RowFilter` into SQL.

use uuid::Uuid;

use crate::auth::{UserRole, UserSession};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    UserProfile,
    Routine,
    Exercise,
    Relationship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Read,
    Create,
    Update,
    Delete,
    UpdateRole,
    AssignRoutine,
    RemoveRoutine,
}

/// What an action is aimed at, carrying only the facts the rules need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A collection, for list and create
    Collection(Resource),
    Profile {
        id: Uuid,
        /// The profile is the other party of one of the caller's relationships
        linked: bool,
    },
    Routine {
        instructor_id: Uuid,
        assigned_to_caller: bool,
        is_active: bool,
    },
    Exercise {
        created_by: Uuid,
    },
    Relationship {
        instructor_id: Uuid,
        client_id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turn a denial into a `Forbidden` error
    pub fn require(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AppError::forbidden(reason)),
        }
    }
}

/// Row filter applied to list and lookup queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All,
    /// Routines owned by this instructor
    OwnedBy(Uuid),
    /// Active routines assigned to this client through any relationship
    AssignedToClient(Uuid),
    /// Relationships where this profile is either party
    PartyTo(Uuid),
    /// This profile plus the clients of its relationships
    SelfAndClients(Uuid),
    /// This profile plus the instructors of its relationships
    SelfAndInstructors(Uuid),
}

pub fn filter_predicate(session: &UserSession, resource: Resource) -> RowFilter {
    let me = session.profile_id;
    match (resource, session.role) {
        (Resource::UserProfile, UserRole::Instructor) => RowFilter::SelfAndClients(me),
        (Resource::UserProfile, UserRole::Client) => RowFilter::SelfAndInstructors(me),
        (Resource::Routine, UserRole::Instructor) => RowFilter::OwnedBy(me),
        (Resource::Routine, UserRole::Client) => RowFilter::AssignedToClient(me),
        (Resource::Exercise, _) => RowFilter::All,
        (Resource::Relationship, _) => RowFilter::PartyTo(me),
    }
}

pub fn evaluate(session: &UserSession, action: Action, target: &Target) -> Decision {
    let me = session.profile_id;
    let instructor = session.is_instructor();

    match (*target, action) {
        (Target::Collection(_), Action::List) => Decision::Allow,
        (Target::Collection(Resource::Routine), Action::Create)
        | (Target::Collection(Resource::Exercise), Action::Create)
        | (Target::Collection(Resource::Relationship), Action::Create) => {
            if instructor {
                Decision::Allow
            } else {
                Decision::Deny("Only instructors can create this resource")
            }
        }

        (Target::Profile { id, linked }, Action::Read) => {
            if id == me || linked {
                Decision::Allow
            } else {
                Decision::Deny("Profile is not visible to you")
            }
        }
        (Target::Profile { id, .. }, Action::Update) => {
            if id == me {
                Decision::Allow
            } else {
                Decision::Deny("You can only update your own profile")
            }
        }
        (Target::Profile { .. }, Action::UpdateRole) => {
            if instructor {
                Decision::Allow
            } else {
                Decision::Deny("Only instructors can update roles")
            }
        }

        (
            Target::Routine {
                instructor_id,
                assigned_to_caller,
                is_active,
            },
            Action::Read,
        ) => {
            let visible = if instructor {
                instructor_id == me
            } else {
                assigned_to_caller && is_active
            };
            if visible {
                Decision::Allow
            } else {
                Decision::Deny("Routine is not visible to you")
            }
        }
        (Target::Routine { instructor_id, .. }, Action::Update | Action::Delete) => {
            if instructor && instructor_id == me {
                Decision::Allow
            } else {
                Decision::Deny("Only the owning instructor can modify this routine")
            }
        }

        (Target::Exercise { .. }, Action::Read) => Decision::Allow,
        (Target::Exercise { created_by }, Action::Update | Action::Delete) => {
            if created_by == me {
                Decision::Allow
            } else {
                Decision::Deny("Only the creator can modify this exercise")
            }
        }

        (Target::Relationship { instructor_id, client_id }, Action::Read) => {
            if instructor_id == me || client_id == me {
                Decision::Allow
            } else {
                Decision::Deny("Relationship is not visible to you")
            }
        }
        (
            Target::Relationship { instructor_id, .. },
            Action::Update | Action::Delete | Action::AssignRoutine | Action::RemoveRoutine,
        ) => {
            if instructor_id == me {
                Decision::Allow
            } else {
                Decision::Deny("Only the relationship's instructor can modify it")
            }
        }

        _ => Decision::Deny("Action not permitted"),
    }
}
