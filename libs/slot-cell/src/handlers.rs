// libs/slot-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CancelSlotsByDateRequest, CancelSlotsRequest, ConvertDeliveryModeRequest,
    GenerateSlotsRequest, ShiftSlotRequest, SlotError,
};
use crate::services::availability::AvailabilityService;
use crate::services::generator::SlotGeneratorService;
use crate::services::modification::SlotModificationService;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

fn slot_error_response(err: SlotError) -> AppError {
    match err {
        SlotError::Validation(msg) => AppError::ValidationError(msg),
        SlotError::NotFound => AppError::NotFound("Slot not found".to_string()),
        SlotError::Conflict => {
            AppError::Conflict("Slot would overlap an existing slot".to_string())
        }
        SlotError::Unavailable => {
            AppError::Conflict("Slot is no longer available".to_string())
        }
        SlotError::InvalidState(state) => {
            AppError::Conflict(format!("Operation not permitted while slot is {}", state))
        }
        SlotError::Database(msg) => AppError::Database(msg),
    }
}

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

fn require_scheduler_role(user: &User) -> Result<(), AppError> {
    match user.role.as_deref() {
        Some("doctor") | Some("admin") => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only doctors can manage slots".to_string(),
        )),
    }
}

// ==============================================================================
// SLOT GENERATION
// ==============================================================================

#[axum::debug_handler]
pub async fn generate_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<GenerateSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Doctors generate their own calendar; admins may generate for anyone.
    let is_owner = request.doctor_id.to_string() == user.id;
    let is_admin = user.role.as_deref() == Some("admin");
    if !is_owner && !is_admin {
        return Err(AppError::Forbidden(
            "Not authorized to generate slots for this doctor".to_string(),
        ));
    }

    let generator = SlotGeneratorService::new(&state);
    let report = generator
        .generate(request, token)
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "created_count": report.created_count,
        "skipped_count": report.skipped_count,
        "message": format!(
            "{} slots created, {} skipped as overlapping",
            report.created_count, report.skipped_count
        )
    })))
}

// ==============================================================================
// AVAILABILITY SEARCH
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state);
    let slots = availability
        .slots_for_doctor(doctor_id, query.date, auth.token())
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_free_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state);
    let slots = availability
        .free_slots_for_doctor(doctor_id, query.date, auth.token())
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn search_by_specialty(
    State(state): State<Arc<AppConfig>>,
    Path(specialty_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state);
    let slots = availability
        .free_slots_by_specialty(specialty_id, auth.token())
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "slots": slots
    })))
}

// ==============================================================================
// SLOT MODIFICATION
// ==============================================================================

#[axum::debug_handler]
pub async fn shift_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ShiftSlotRequest>,
) -> Result<Json<Value>, AppError> {
    require_scheduler_role(&user)?;

    let modification = SlotModificationService::new(&state);
    let slot = modification
        .shift_slot(slot_id, request, auth.token())
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot rescheduled"
    })))
}

#[axum::debug_handler]
pub async fn cancel_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    require_scheduler_role(&user)?;

    let modification = SlotModificationService::new(&state);
    let report = modification
        .cancel_slots(request.slot_ids, auth.token())
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "cancelled_count": report.cancelled_count
    })))
}

#[axum::debug_handler]
pub async fn cancel_slots_by_date(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelSlotsByDateRequest>,
) -> Result<Json<Value>, AppError> {
    require_scheduler_role(&user)?;

    // Doctors sweep their own calendar; admins sweep every doctor's.
    let scope = if user.role.as_deref() == Some("admin") {
        None
    } else {
        Some(caller_id(&user)?)
    };

    let modification = SlotModificationService::new(&state);
    let report = modification
        .cancel_slots_by_date(request.date, scope, auth.token())
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "cancelled_count": report.cancelled_count
    })))
}

#[axum::debug_handler]
pub async fn convert_delivery_mode(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ConvertDeliveryModeRequest>,
) -> Result<Json<Value>, AppError> {
    require_scheduler_role(&user)?;

    let modification = SlotModificationService::new(&state);
    let slot = modification
        .convert_delivery_mode(slot_id, request.delivery_mode, auth.token())
        .await
        .map_err(slot_error_response)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Delivery mode updated"
    })))
}
