// libs/slot-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE SLOT MODELS
// ==============================================================================

/// A bookable unit of doctor time. Slots are the single source of truth for
/// the scheduling engine; appointments only ever reference them by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub delivery_mode: DeliveryMode,
    pub state: SlotState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Whether this slot's window overlaps another window on the same date.
    /// Windows are half-open `[start, end)`.
    pub fn overlaps(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        self.slot_date == date && windows_overlap(self.start_time, self.end_time, start, end)
    }

    /// A slot whose start lies before `now` is immutable for booking and
    /// shifting purposes; it stays readable for audit.
    pub fn is_past(&self, now: chrono::NaiveDateTime) -> bool {
        self.slot_date.and_time(self.start_time) < now
    }
}

pub fn windows_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Free,
    Booked,
    Cancelled,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Free => write!(f, "free"),
            SlotState::Booked => write!(f, "booked"),
            SlotState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Physical,
    Telemedicine,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Physical => write!(f, "physical"),
            DeliveryMode::Telemedicine => write!(f, "telemedicine"),
        }
    }
}

/// A slot about to be inserted; ids and audit columns are assigned at
/// insertion time.
#[derive(Debug, Clone)]
pub struct SlotCandidate {
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub delivery_mode: DeliveryMode,
}

impl SlotCandidate {
    pub fn overlaps_slot(&self, slot: &Slot) -> bool {
        slot.overlaps(self.slot_date, self.start_time, self.end_time)
    }
}

/// Doctor profile as held by the external party store. Read-only here; the
/// scheduling engine resolves ids and specialty membership, nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub full_name: String,
    pub specialty_ids: Vec<Uuid>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateSlotsRequest {
    pub doctor_id: Uuid,
    pub delivery_mode: DeliveryMode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateSlotsReport {
    pub created_count: usize,
    pub skipped_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSlotRequest {
    pub new_date: NaiveDate,
    pub new_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSlotsRequest {
    pub slot_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSlotsByDateRequest {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReport {
    pub cancelled_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertDeliveryModeRequest {
    pub delivery_mode: DeliveryMode,
}

/// Free slot tagged with its doctor, as returned by specialty-wide search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialtySlot {
    pub doctor_id: Uuid,
    pub slot: Slot,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Slot not found")]
    NotFound,

    #[error("Slot would overlap an existing slot")]
    Conflict,

    #[error("Slot is no longer available")]
    Unavailable,

    #[error("Operation not permitted while slot is {0}")]
    InvalidState(SlotState),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<shared_database::supabase::SupabaseError> for SlotError {
    fn from(err: shared_database::supabase::SupabaseError) -> Self {
        use shared_database::supabase::SupabaseError;
        match err {
            SupabaseError::Conflict(_) => SlotError::Conflict,
            other => SlotError::Database(other.to_string()),
        }
    }
}
