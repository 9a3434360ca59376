// libs/appointment-cell/src/services/policy.rs
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::Appointment;

/// Authenticated caller identity as the core sees it. The gateway has
/// already validated the token; ownership decisions here only compare ids
/// and roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Caller {
    /// Unknown roles get the least-privileged treatment.
    pub fn from_user(user: &User) -> Result<Self, String> {
        let user_id =
            Uuid::parse_str(&user.id).map_err(|_| "Invalid user id in token".to_string())?;
        let role = match user.role.as_deref() {
            Some("doctor") => Role::Doctor,
            Some("admin") => Role::Admin,
            _ => Role::Patient,
        };
        Ok(Self { user_id, role })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

fn allow_when(condition: bool) -> Decision {
    if condition {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Reading: the owning user or the assigned doctor.
pub fn can_view_appointment(caller: &Caller, appointment: &Appointment) -> Decision {
    allow_when(
        caller.user_id == appointment.created_by || caller.user_id == appointment.doctor_id,
    )
}

/// Updating (reschedule, state changes): the owning user or the assigned
/// doctor.
pub fn can_update_appointment(caller: &Caller, appointment: &Appointment) -> Decision {
    allow_when(
        caller.user_id == appointment.created_by || caller.user_id == appointment.doctor_id,
    )
}

/// Deleting is reserved for the owning user; the doctor may read and update
/// but never delete.
pub fn can_delete_appointment(caller: &Caller, appointment: &Appointment) -> Decision {
    allow_when(caller.user_id == appointment.created_by)
}
