// libs/slot-cell/src/services/store.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{DeliveryMode, Slot, SlotCandidate, SlotError, SlotState};

/// Narrow repository over the `slots` table. Every state transition goes
/// through here as a single filtered write; the state filter doubles as the
/// compare-and-set guard, so two racing writers can never both see a row in
/// the required state.
pub struct SlotStore {
    supabase: Arc<SupabaseClient>,
}

impl SlotStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, SlotError> {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let result: Vec<Slot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result.into_iter().next().ok_or(SlotError::NotFound)
    }

    /// All slots for a doctor on a date, ordered by start time, regardless of
    /// state. Backs the doctor's own calendar view.
    pub async fn for_doctor_on_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&slot_date=eq.{}&order=start_time.asc",
            doctor_id, date
        );
        Ok(self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?)
    }

    pub async fn free_for_doctor_on_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&slot_date=eq.{}&state=eq.free&order=start_time.asc",
            doctor_id, date
        );
        Ok(self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?)
    }

    /// Non-cancelled slots for a doctor across a date range. This is what
    /// generation and shifting check candidates against.
    pub async fn active_for_doctor_between(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&slot_date=gte.{}&slot_date=lte.{}&state=neq.cancelled&order=slot_date.asc,start_time.asc",
            doctor_id, from, to
        );
        Ok(self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?)
    }

    /// Free future slots across a set of doctors, ordered by (date, time).
    pub async fn free_from_date_for_doctors(
        &self,
        doctor_ids: &[Uuid],
        from: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        if doctor_ids.is_empty() {
            return Ok(vec![]);
        }

        let id_list = doctor_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!(
            "/rest/v1/slots?doctor_id=in.({})&state=eq.free&slot_date=gte.{}&order=slot_date.asc,start_time.asc",
            id_list, from
        );
        Ok(self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?)
    }

    /// Exact-window lookup used by the legacy booking path.
    pub async fn find_free_at(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        auth_token: &str,
    ) -> Result<Option<Slot>, SlotError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&slot_date=eq.{}&start_time=eq.{}&state=eq.free",
            doctor_id,
            date,
            time.format("%H:%M:%S")
        );
        let result: Vec<Slot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        Ok(result.into_iter().next())
    }

    /// Insert a whole batch of candidates in one request. PostgREST executes
    /// a single INSERT, so the batch commits or rolls back as a unit and a
    /// crash can never leave part of it behind.
    pub async fn insert_batch(
        &self,
        candidates: &[SlotCandidate],
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<Value> = candidates
            .iter()
            .map(|c| {
                json!({
                    "doctor_id": c.doctor_id,
                    "slot_date": c.slot_date.to_string(),
                    "start_time": c.start_time.format("%H:%M:%S").to_string(),
                    "end_time": c.end_time.format("%H:%M:%S").to_string(),
                    "duration_minutes": c.duration_minutes,
                    "delivery_mode": c.delivery_mode.to_string(),
                    "state": SlotState::Free.to_string(),
                    "created_at": now,
                    "updated_at": now
                })
            })
            .collect();

        debug!("Inserting batch of {} slots", rows.len());

        let created: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/slots",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(return_representation()),
            )
            .await?;

        Ok(created)
    }

    pub async fn insert_one(
        &self,
        candidate: &SlotCandidate,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        let created = self
            .insert_batch(std::slice::from_ref(candidate), auth_token)
            .await?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| SlotError::Database("Insert returned no row".to_string()))
    }

    /// Atomically claim a free slot for booking. The `state=eq.free` filter
    /// is the compare-and-set: of two racing claims, exactly one sees the
    /// row while it is still free and gets it back; the other gets nothing.
    pub async fn claim(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, SlotError> {
        let path = format!("/rest/v1/slots?id=eq.{}&state=eq.free", slot_id);
        let body = json!({
            "state": SlotState::Booked.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let updated: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        updated.into_iter().next().ok_or(SlotError::Unavailable)
    }

    /// Release a booked slot back to free. Returns `None` when the slot was
    /// not booked (already released or cancelled): a no-op, not an error.
    pub async fn release(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Slot>, SlotError> {
        let path = format!("/rest/v1/slots?id=eq.{}&state=eq.booked", slot_id);
        let body = json!({
            "state": SlotState::Free.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let updated: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        Ok(updated.into_iter().next())
    }

    /// Move a non-cancelled slot to a new window in place. Identity and
    /// state are untouched; any bound appointment keeps pointing at the same
    /// id and needs no rewrite.
    pub async fn update_schedule(
        &self,
        slot_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        let path = format!("/rest/v1/slots?id=eq.{}&state=neq.cancelled", slot_id);
        let body = json!({
            "slot_date": date.to_string(),
            "start_time": start.format("%H:%M:%S").to_string(),
            "end_time": end.format("%H:%M:%S").to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let updated: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        updated
            .into_iter()
            .next()
            .ok_or(SlotError::InvalidState(SlotState::Cancelled))
    }

    /// Cancel the given slots. Already-cancelled ids fall outside the filter
    /// and come back untouched, which is what makes the operation idempotent;
    /// the returned rows are exactly the slots that changed.
    pub async fn cancel_many(
        &self,
        slot_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        if slot_ids.is_empty() {
            return Ok(vec![]);
        }

        let id_list = slot_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!(
            "/rest/v1/slots?id=in.({})&state=neq.cancelled",
            id_list
        );
        let body = json!({
            "state": SlotState::Cancelled.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        Ok(self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?)
    }

    /// Cancel every non-cancelled slot on a date, optionally scoped to one
    /// doctor. Returns the rows that changed.
    pub async fn cancel_for_date(
        &self,
        date: NaiveDate,
        doctor_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let mut path = format!(
            "/rest/v1/slots?slot_date=eq.{}&state=neq.cancelled",
            date
        );
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        let body = json!({
            "state": SlotState::Cancelled.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        Ok(self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?)
    }

    /// Flip a non-cancelled slot's delivery mode in place. `None` means the
    /// guard matched nothing: the slot is cancelled or missing; the caller
    /// decides which.
    pub async fn set_delivery_mode(
        &self,
        slot_id: Uuid,
        mode: DeliveryMode,
        auth_token: &str,
    ) -> Result<Option<Slot>, SlotError> {
        let path = format!("/rest/v1/slots?id=eq.{}&state=neq.cancelled", slot_id);
        let body = json!({
            "delivery_mode": mode.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let updated: Vec<Slot> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await?;

        Ok(updated.into_iter().next())
    }
}
