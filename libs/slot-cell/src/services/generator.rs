// libs/slot-cell/src/services/generator.rs
use chrono::{Duration as ChronoDuration, NaiveTime, Utc};
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::models::{GenerateSlotsReport, GenerateSlotsRequest, SlotCandidate, SlotError};
use crate::services::store::SlotStore;

pub struct SlotGeneratorService {
    store: SlotStore,
}

impl SlotGeneratorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: SlotStore::new(config),
        }
    }

    /// Expand a generation request into the ordered candidate sequence.
    /// Pure date/time arithmetic, no clock and no store access: for every
    /// calendar date in the range, slots of `duration_minutes` are laid out
    /// from `start_time`; a final segment shorter than the duration is
    /// dropped rather than emitted short.
    pub fn expand_candidates(
        request: &GenerateSlotsRequest,
    ) -> Result<Vec<SlotCandidate>, SlotError> {
        if request.duration_minutes <= 0 {
            return Err(SlotError::Validation(
                "Slot duration must be positive".to_string(),
            ));
        }
        if request.start_time >= request.end_time {
            return Err(SlotError::Validation(
                "Start time must be before end time".to_string(),
            ));
        }
        if request.start_date > request.end_date {
            return Err(SlotError::Validation(
                "Start date must not be after end date".to_string(),
            ));
        }

        let mut candidates = Vec::new();
        let mut date = request.start_date;

        loop {
            let mut slot_start = request.start_time;
            while let Some(slot_end) = add_minutes(slot_start, request.duration_minutes) {
                if slot_end > request.end_time {
                    break;
                }
                candidates.push(SlotCandidate {
                    doctor_id: request.doctor_id,
                    slot_date: date,
                    start_time: slot_start,
                    end_time: slot_end,
                    duration_minutes: request.duration_minutes,
                    delivery_mode: request.delivery_mode,
                });
                slot_start = slot_end;
            }

            if date >= request.end_date {
                break;
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(candidates)
    }

    /// Generate and persist slots for a doctor. Candidates that would
    /// overlap an existing non-cancelled slot are skipped, not errors; the
    /// survivors go into the store as one atomic batch.
    pub async fn generate(
        &self,
        request: GenerateSlotsRequest,
        auth_token: &str,
    ) -> Result<GenerateSlotsReport, SlotError> {
        let now = Utc::now().naive_utc();
        if request.start_date.and_time(request.start_time) < now {
            return Err(SlotError::Validation(
                "Cannot generate slots in the past".to_string(),
            ));
        }

        let candidates = Self::expand_candidates(&request)?;
        debug!(
            "Expanded {} candidate slots for doctor {} between {} and {}",
            candidates.len(),
            request.doctor_id,
            request.start_date,
            request.end_date
        );

        let existing = self
            .store
            .active_for_doctor_between(
                request.doctor_id,
                request.start_date,
                request.end_date,
                auth_token,
            )
            .await?;

        let (to_create, skipped): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| !existing.iter().any(|slot| c.overlaps_slot(slot)));

        let created_count = if to_create.is_empty() {
            0
        } else {
            self.store.insert_batch(&to_create, auth_token).await?.len()
        };

        info!(
            "Generated {} slots for doctor {} ({} skipped as overlapping)",
            created_count,
            request.doctor_id,
            skipped.len()
        );

        Ok(GenerateSlotsReport {
            created_count,
            skipped_count: skipped.len(),
        })
    }
}

/// Add minutes to a time of day; `None` when the result would cross
/// midnight. Slots never span dates.
pub(crate) fn add_minutes(time: NaiveTime, minutes: i32) -> Option<NaiveTime> {
    let (result, overflow) = time.overflowing_add_signed(ChronoDuration::minutes(minutes as i64));
    if overflow != 0 {
        None
    } else {
        Some(result)
    }
}
