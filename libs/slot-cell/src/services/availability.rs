// libs/slot-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{DoctorProfile, Slot, SlotError, SpecialtySlot};
use crate::services::store::SlotStore;

/// Read-only queries over the slot store. Every call goes straight to the
/// store, so a committed booking is visible to the next search; there is no
/// cache to go stale.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    store: SlotStore,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: SlotStore::with_client(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// The doctor's calendar for one date: every slot in start-time order,
    /// tagged with its current state.
    pub async fn slots_for_doctor(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        debug!("Fetching slots for doctor {} on {}", doctor_id, date);
        self.store
            .for_doctor_on_date(doctor_id, date, auth_token)
            .await
    }

    /// The patient-facing view: only free slots.
    pub async fn free_slots_for_doctor(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        debug!("Fetching free slots for doctor {} on {}", doctor_id, date);
        self.store
            .free_for_doctor_on_date(doctor_id, date, auth_token)
            .await
    }

    /// Free upcoming slots across every doctor listing the specialty,
    /// ordered by (date, start time).
    pub async fn free_slots_by_specialty(
        &self,
        specialty_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<SpecialtySlot>, SlotError> {
        let doctors = self.doctors_with_specialty(specialty_id, auth_token).await?;
        if doctors.is_empty() {
            return Ok(vec![]);
        }

        let doctor_ids: Vec<Uuid> = doctors.iter().map(|d| d.id).collect();
        let today = Utc::now().date_naive();

        let slots = self
            .store
            .free_from_date_for_doctors(&doctor_ids, today, auth_token)
            .await?;

        Ok(slots
            .into_iter()
            .map(|slot| SpecialtySlot {
                doctor_id: slot.doctor_id,
                slot,
            })
            .collect())
    }

    /// Resolve doctors whose profile lists the specialty. The party store is
    /// external; we only ask it a contains-query.
    async fn doctors_with_specialty(
        &self,
        specialty_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DoctorProfile>, SlotError> {
        let contains = format!("{{{}}}", specialty_id);
        let path = format!(
            "/rest/v1/doctors?specialty_ids=cs.{}&order=full_name.asc",
            urlencoding::encode(&contains)
        );

        let doctors: Vec<DoctorProfile> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        debug!(
            "Found {} doctors listing specialty {}",
            doctors.len(),
            specialty_id
        );
        Ok(doctors)
    }
}
