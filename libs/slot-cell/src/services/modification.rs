// libs/slot-cell/src/services/modification.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    windows_overlap, CancelReport, DeliveryMode, ShiftSlotRequest, Slot, SlotError, SlotState,
};
use crate::services::generator::add_minutes;
use crate::services::store::SlotStore;

/// Mutations of existing slots: shift, cancel (single, bulk, by-date) and
/// delivery-mode conversion. Cancellation is terminal; a shifted slot keeps
/// its id and its bound appointment.
pub struct SlotModificationService {
    supabase: Arc<SupabaseClient>,
    store: SlotStore,
}

impl SlotModificationService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: SlotStore::with_client(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// Move a slot to a new (date, time) window in place. Fails when the
    /// target window overlaps another non-cancelled slot of the same doctor;
    /// the slot is left untouched in that case.
    pub async fn shift_slot(
        &self,
        slot_id: Uuid,
        request: ShiftSlotRequest,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        let slot = self.store.get(slot_id, auth_token).await?;
        if slot.state == SlotState::Cancelled {
            return Err(SlotError::InvalidState(SlotState::Cancelled));
        }

        let new_start = request.new_time;
        let new_end = add_minutes(new_start, slot.duration_minutes).ok_or_else(|| {
            SlotError::Validation("Shifted slot would cross midnight".to_string())
        })?;

        let now = Utc::now().naive_utc();
        if request.new_date.and_time(new_start) < now {
            return Err(SlotError::Validation(
                "Cannot shift a slot into the past".to_string(),
            ));
        }

        let neighbours = self
            .store
            .active_for_doctor_between(slot.doctor_id, request.new_date, request.new_date, auth_token)
            .await?;

        let collides = neighbours.iter().any(|other| {
            other.id != slot.id
                && windows_overlap(other.start_time, other.end_time, new_start, new_end)
        });
        if collides {
            return Err(SlotError::Conflict);
        }

        let shifted = self
            .store
            .update_schedule(slot_id, request.new_date, new_start, new_end, auth_token)
            .await?;

        info!(
            "Shifted slot {} to {} {}",
            slot_id, request.new_date, new_start
        );
        Ok(shifted)
    }

    /// Cancel a specific set of slots. Idempotent: already-cancelled ids are
    /// no-ops and the report counts only the slots actually changed. Bound
    /// appointments of changed slots are cancelled in cascade.
    pub async fn cancel_slots(
        &self,
        slot_ids: Vec<Uuid>,
        auth_token: &str,
    ) -> Result<CancelReport, SlotError> {
        let unique: Vec<Uuid> = slot_ids
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let changed = self.store.cancel_many(&unique, auth_token).await?;
        self.cascade_cancel_appointments(&changed, auth_token).await?;

        info!("Cancelled {} of {} requested slots", changed.len(), unique.len());
        Ok(CancelReport {
            cancelled_count: changed.len(),
        })
    }

    /// Cancel every non-cancelled slot on a date. `doctor_id` scopes the
    /// sweep to one doctor; `None` sweeps all doctors (admin callers).
    pub async fn cancel_slots_by_date(
        &self,
        date: chrono::NaiveDate,
        doctor_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<CancelReport, SlotError> {
        let changed = self
            .store
            .cancel_for_date(date, doctor_id, auth_token)
            .await?;
        self.cascade_cancel_appointments(&changed, auth_token).await?;

        info!("Cancelled {} slots on {}", changed.len(), date);
        Ok(CancelReport {
            cancelled_count: changed.len(),
        })
    }

    /// Switch a slot between physical and telemedicine delivery without
    /// touching its identity or schedule. A bound appointment follows the
    /// slot's mode.
    pub async fn convert_delivery_mode(
        &self,
        slot_id: Uuid,
        mode: DeliveryMode,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        match self
            .store
            .set_delivery_mode(slot_id, mode, auth_token)
            .await?
        {
            Some(slot) => {
                self.cascade_delivery_mode(slot_id, mode, auth_token).await?;
                info!("Converted slot {} to {}", slot_id, mode);
                Ok(slot)
            }
            None => {
                // Guard matched nothing: missing id or a cancelled slot.
                let slot = self.store.get(slot_id, auth_token).await?;
                Err(SlotError::InvalidState(slot.state))
            }
        }
    }

    /// Propagate slot cancellation to any live appointment bound to one of
    /// the changed slots. Guarded the same way, so replays converge.
    async fn cascade_cancel_appointments(
        &self,
        cancelled: &[Slot],
        auth_token: &str,
    ) -> Result<(), SlotError> {
        if cancelled.is_empty() {
            return Ok(());
        }

        let id_list = cancelled
            .iter()
            .map(|slot| slot.id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!(
            "/rest/v1/appointments?slot_id=in.({})&state=neq.cancelled",
            id_list
        );
        let body = json!({
            "state": "cancelled",
            "updated_at": Utc::now().to_rfc3339()
        });

        let cascaded: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        if !cascaded.is_empty() {
            warn!(
                "Cascaded cancellation to {} bound appointments",
                cascaded.len()
            );
        }
        Ok(())
    }

    async fn cascade_delivery_mode(
        &self,
        slot_id: Uuid,
        mode: DeliveryMode,
        auth_token: &str,
    ) -> Result<(), SlotError> {
        let path = format!(
            "/rest/v1/appointments?slot_id=eq.{}&state=neq.cancelled",
            slot_id
        );
        let body = json!({
            "delivery_mode": mode.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        Ok(())
    }
}
