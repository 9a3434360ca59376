// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use slot_cell::models::{DeliveryMode, SlotError};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A patient's claim on one slot. The schedule itself (date, times) lives on
/// the slot; shifting the slot moves the appointment with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub institution_id: Uuid,
    pub specialty_id: Uuid,
    pub urgency: Urgency,
    pub visit_type: VisitType,
    pub delivery_mode: DeliveryMode,
    pub state: AppointmentState,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentState {
    Free,
    Confirmed,
    Cancelled,
}

impl AppointmentState {
    /// Transitions only ever move forward: free -> confirmed -> cancelled.
    pub fn can_transition_to(&self, next: AppointmentState) -> bool {
        matches!(
            (self, next),
            (AppointmentState::Free, AppointmentState::Confirmed)
                | (AppointmentState::Free, AppointmentState::Cancelled)
                | (AppointmentState::Confirmed, AppointmentState::Cancelled)
        )
    }
}

impl fmt::Display for AppointmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentState::Free => write!(f, "free"),
            AppointmentState::Confirmed => write!(f, "confirmed"),
            AppointmentState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Urgency codes; single-letter aliases accepted for legacy clients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    #[serde(alias = "a")]
    Normal,
    #[serde(alias = "b")]
    Urgent,
    #[serde(alias = "c")]
    Emergency,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Normal => write!(f, "normal"),
            Urgency::Urgent => write!(f, "urgent"),
            Urgency::Emergency => write!(f, "emergency"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    New,
    Followup,
    #[default]
    General,
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitType::New => write!(f, "new"),
            VisitType::Followup => write!(f, "followup"),
            VisitType::General => write!(f, "general"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    /// Explicit target slot. When absent, the legacy doctor + date + time
    /// form below is used to resolve (or synthesize) one.
    pub slot_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,

    pub institution_id: Uuid,
    pub specialty_id: Uuid,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub visit_type: VisitType,
    /// Optional; when given it must agree with the target slot's mode.
    pub delivery_mode: Option<DeliveryMode>,
}

/// The two ways a booking can name its slot.
#[derive(Debug, Clone, Copy)]
pub enum BookingTarget {
    Slot(Uuid),
    Schedule {
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    },
}

impl BookAppointmentRequest {
    pub fn target(&self) -> Result<BookingTarget, BookingError> {
        if let Some(slot_id) = self.slot_id {
            return Ok(BookingTarget::Slot(slot_id));
        }
        match (self.doctor_id, self.appointment_date, self.appointment_time) {
            (Some(doctor_id), Some(date), Some(time)) => Ok(BookingTarget::Schedule {
                doctor_id,
                date,
                time,
            }),
            _ => Err(BookingError::Validation(
                "Provide slot_id, or doctor_id with appointment_date and appointment_time"
                    .to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub state: Option<AppointmentState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAppointmentsQuery {
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    #[error("Caller does not own this appointment")]
    Forbidden,

    #[error("Slot is no longer available")]
    SlotUnavailable,

    #[error("Slot would overlap an existing slot")]
    SlotConflict,

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SlotError> for BookingError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::Validation(msg) => BookingError::Validation(msg),
            SlotError::NotFound => BookingError::NotFound,
            SlotError::Conflict => BookingError::SlotConflict,
            SlotError::Unavailable => BookingError::SlotUnavailable,
            SlotError::InvalidState(state) => {
                BookingError::InvalidState(format!("slot is {}", state))
            }
            SlotError::Database(msg) => BookingError::Database(msg),
        }
    }
}

impl From<shared_database::supabase::SupabaseError> for BookingError {
    fn from(err: shared_database::supabase::SupabaseError) -> Self {
        use shared_database::supabase::SupabaseError;
        match err {
            SupabaseError::Conflict(_) => BookingError::SlotConflict,
            other => BookingError::Database(other.to_string()),
        }
    }
}
