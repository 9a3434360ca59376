// libs/appointment-cell/src/services/booking.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use slot_cell::models::{DeliveryMode, Slot, SlotCandidate, SlotError};
use slot_cell::services::store::SlotStore;

use crate::models::{
    Appointment, AppointmentState, BookAppointmentRequest, BookingError, BookingTarget,
    UpdateAppointmentRequest,
};
use crate::services::policy::{
    can_delete_appointment, can_update_appointment, can_view_appointment, Caller,
};

/// Duration of a slot synthesized by the legacy date-only booking path.
pub const DEFAULT_SLOT_DURATION_MINUTES: i32 = 20;

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    slots: SlotStore,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            slots: SlotStore::with_client(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// Book an appointment against a free slot. The slot is claimed with a
    /// compare-and-set before the appointment row is written; of two racing
    /// bookings exactly one claim succeeds and the loser gets
    /// `SlotUnavailable` without blocking. A failed appointment insert puts
    /// the claimed slot back.
    pub async fn book_appointment(
        &self,
        caller: &Caller,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let target = request.target()?;
        let slot = self
            .resolve_slot(target, request.delivery_mode, auth_token)
            .await?;

        let now = Utc::now().naive_utc();
        if slot.is_past(now) {
            return Err(BookingError::Validation(
                "Cannot book a slot in the past".to_string(),
            ));
        }
        if let Some(mode) = request.delivery_mode {
            if mode != slot.delivery_mode {
                return Err(BookingError::Validation(format!(
                    "Requested delivery mode {} does not match the slot's {}",
                    mode, slot.delivery_mode
                )));
            }
        }

        let claimed = self.slots.claim(slot.id, auth_token).await?;

        match self
            .insert_appointment(&claimed, caller, &request, auth_token)
            .await
        {
            Ok(appointment) => {
                info!(
                    "Booked appointment {} on slot {} for patient {}",
                    appointment.id, claimed.id, caller.user_id
                );
                Ok(appointment)
            }
            Err(err) => {
                // The claim went through but the appointment write did not;
                // put the slot back so it can be booked again.
                if let Err(release_err) = self.slots.release(claimed.id, auth_token).await {
                    warn!(
                        "Failed to release slot {} after aborted booking: {}",
                        claimed.id, release_err
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn get_appointment(
        &self,
        caller: &Caller,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.fetch(appointment_id, auth_token).await?;
        if !can_view_appointment(caller, &appointment).is_allowed() {
            return Err(BookingError::Forbidden);
        }
        Ok(appointment)
    }

    /// Update an appointment: move it to another free slot and/or advance its
    /// state. Re-targeting claims the new slot before releasing the old one,
    /// so the appointment is never left without a booked slot.
    pub async fn update_appointment(
        &self,
        caller: &Caller,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.fetch(appointment_id, auth_token).await?;
        if !can_update_appointment(caller, &appointment).is_allowed() {
            return Err(BookingError::Forbidden);
        }

        if let Some(new_state) = request.state {
            if !appointment.state.can_transition_to(new_state) {
                return Err(BookingError::InvalidState(format!(
                    "{} -> {}",
                    appointment.state, new_state
                )));
            }
        }

        let retarget = match (request.appointment_date, request.appointment_time) {
            (Some(date), Some(time)) => Some((date, time)),
            (None, None) => None,
            _ => {
                return Err(BookingError::Validation(
                    "Both appointment_date and appointment_time are required to reschedule"
                        .to_string(),
                ))
            }
        };

        if retarget.is_some() && appointment.state == AppointmentState::Cancelled {
            return Err(BookingError::InvalidState(
                "appointment is cancelled".to_string(),
            ));
        }

        let now = Utc::now().naive_utc();
        let mut update_data = serde_json::Map::new();

        if let Some((date, time)) = retarget {
            let new_slot = self
                .slots
                .find_free_at(appointment.doctor_id, date, time, auth_token)
                .await?
                .ok_or(BookingError::SlotUnavailable)?;
            if new_slot.is_past(now) {
                return Err(BookingError::Validation(
                    "Cannot reschedule into the past".to_string(),
                ));
            }

            let claimed = self.slots.claim(new_slot.id, auth_token).await?;

            let old_slot = self.slots.get(appointment.slot_id, auth_token).await?;
            if old_slot.is_past(now) {
                debug!(
                    "Old slot {} is in the past; leaving it booked for audit",
                    old_slot.id
                );
            } else if let Err(err) = self.slots.release(old_slot.id, auth_token).await {
                warn!("Failed to release slot {}: {}", old_slot.id, err);
            }

            update_data.insert("slot_id".to_string(), json!(claimed.id));
            update_data.insert(
                "delivery_mode".to_string(),
                json!(claimed.delivery_mode.to_string()),
            );
        }

        if let Some(new_state) = request.state {
            update_data.insert("state".to_string(), json!(new_state.to_string()));
        }

        if update_data.is_empty() {
            return Ok(appointment);
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let updated: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(serde_json::Value::Object(update_data)),
                Some(return_representation()),
            )
            .await?;
        let updated = updated.into_iter().next().ok_or(BookingError::NotFound)?;

        // Cancelling hands the slot back, unless its time has already passed.
        if request.state == Some(AppointmentState::Cancelled) {
            self.release_unless_past(updated.slot_id, auth_token).await;
        }

        info!("Appointment {} updated", appointment_id);
        Ok(updated)
    }

    /// Cancel-and-release, owner only. The slot goes back to free unless its
    /// time has passed, in which case it stays booked for the audit trail.
    pub async fn delete_appointment(
        &self,
        caller: &Caller,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.fetch(appointment_id, auth_token).await?;
        if appointment.state == AppointmentState::Cancelled {
            return Err(BookingError::NotFound);
        }
        if !can_delete_appointment(caller, &appointment).is_allowed() {
            return Err(BookingError::Forbidden);
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&state=neq.cancelled",
            appointment_id
        );
        let body = json!({
            "state": AppointmentState::Cancelled.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });
        let cancelled: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;
        // Empty here means someone cancelled it between our read and write.
        let cancelled = cancelled.into_iter().next().ok_or(BookingError::NotFound)?;

        self.release_unless_past(cancelled.slot_id, auth_token).await;

        info!("Appointment {} deleted by owner {}", appointment_id, caller.user_id);
        Ok(cancelled)
    }

    /// The caller's own appointments, newest first, optionally narrowed to
    /// the date of their slot.
    pub async fn appointments_for_patient(
        &self,
        caller: &Caller,
        date: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=created_at.desc",
            caller.user_id
        );
        let appointments: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let Some(date) = date else {
            return Ok(appointments);
        };
        if appointments.is_empty() {
            return Ok(appointments);
        }

        let slot_ids: Vec<String> = appointments
            .iter()
            .map(|a| a.slot_id.to_string())
            .collect();
        let path = format!(
            "/rest/v1/slots?id=in.({})&slot_date=eq.{}",
            slot_ids.join(","),
            date
        );
        let slots: Vec<Slot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        let on_date: HashSet<Uuid> = slots.into_iter().map(|s| s.id).collect();

        Ok(appointments
            .into_iter()
            .filter(|a| on_date.contains(&a.slot_id))
            .collect())
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    async fn fetch(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        result.into_iter().next().ok_or(BookingError::NotFound)
    }

    /// Resolve the booking target to a concrete slot. The legacy schedule
    /// form falls back to synthesizing a minimal free slot when no slot
    /// exists at the requested instant.
    async fn resolve_slot(
        &self,
        target: BookingTarget,
        requested_mode: Option<DeliveryMode>,
        auth_token: &str,
    ) -> Result<Slot, BookingError> {
        match target {
            BookingTarget::Slot(slot_id) => Ok(self.slots.get(slot_id, auth_token).await?),
            BookingTarget::Schedule {
                doctor_id,
                date,
                time,
            } => {
                if let Some(slot) = self
                    .slots
                    .find_free_at(doctor_id, date, time, auth_token)
                    .await?
                {
                    return Ok(slot);
                }

                debug!(
                    "No free slot for doctor {} at {} {}; synthesizing one",
                    doctor_id, date, time
                );
                let end_time = schedule_end(time)?;
                let candidate = SlotCandidate {
                    doctor_id,
                    slot_date: date,
                    start_time: time,
                    end_time,
                    duration_minutes: DEFAULT_SLOT_DURATION_MINUTES,
                    delivery_mode: requested_mode.unwrap_or(DeliveryMode::Physical),
                };

                let existing = self
                    .slots
                    .active_for_doctor_between(doctor_id, date, date, auth_token)
                    .await?;
                if existing.iter().any(|slot| candidate.overlaps_slot(slot)) {
                    // The window exists but is not free; retry with a fresh search.
                    return Err(BookingError::SlotUnavailable);
                }

                self.slots
                    .insert_one(&candidate, auth_token)
                    .await
                    .map_err(|err| match err {
                        // Lost a race against a concurrent generation run.
                        SlotError::Conflict => BookingError::SlotUnavailable,
                        other => other.into(),
                    })
            }
        }
    }

    async fn insert_appointment(
        &self,
        slot: &Slot,
        caller: &Caller,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let now = Utc::now().to_rfc3339();
        let body = json!({
            "slot_id": slot.id,
            "patient_id": caller.user_id,
            "doctor_id": slot.doctor_id,
            "institution_id": request.institution_id,
            "specialty_id": request.specialty_id,
            "urgency": request.urgency.to_string(),
            "visit_type": request.visit_type.to_string(),
            "delivery_mode": slot.delivery_mode.to_string(),
            "state": AppointmentState::Free.to_string(),
            "created_by": caller.user_id,
            "created_at": now,
            "updated_at": now
        });

        let created: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        created
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::Database("Insert returned no row".to_string()))
    }

    async fn release_unless_past(&self, slot_id: Uuid, auth_token: &str) {
        let now = Utc::now().naive_utc();
        match self.slots.get(slot_id, auth_token).await {
            Ok(slot) if slot.is_past(now) => {
                debug!("Slot {} is in the past; release refused", slot_id);
            }
            Ok(_) => {
                if let Err(err) = self.slots.release(slot_id, auth_token).await {
                    warn!("Failed to release slot {}: {}", slot_id, err);
                }
            }
            Err(err) => warn!("Could not load slot {} for release: {}", slot_id, err),
        }
    }
}

fn schedule_end(start: NaiveTime) -> Result<NaiveTime, BookingError> {
    let (end, overflow) = start.overflowing_add_signed(ChronoDuration::minutes(
        DEFAULT_SLOT_DURATION_MINUTES as i64,
    ));
    if overflow != 0 {
        return Err(BookingError::Validation(
            "Appointment would cross midnight".to_string(),
        ));
    }
    Ok(end)
}
