// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BookAppointmentRequest, BookingError, PatientAppointmentsQuery, UpdateAppointmentRequest,
};
use crate::services::booking::BookingService;
use crate::services::policy::Caller;

fn caller_from(user: &User) -> Result<Caller, AppError> {
    Caller::from_user(user).map_err(AppError::Auth)
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .book_appointment(&caller, request, auth.token())
        .await
        .map_err(|e| match e {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::NotFound => AppError::NotFound("Target slot not found".to_string()),
            BookingError::SlotUnavailable => {
                AppError::Conflict("Slot is no longer available".to_string())
            }
            BookingError::SlotConflict => {
                AppError::Conflict("Slot would overlap an existing slot".to_string())
            }
            BookingError::InvalidState(msg) => AppError::Conflict(msg),
            BookingError::Forbidden => {
                AppError::Forbidden("Not authorized to book this appointment".to_string())
            }
            BookingError::Database(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(&caller, appointment_id, auth.token())
        .await
        .map_err(|e| match e {
            BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            BookingError::Forbidden => {
                AppError::Forbidden("Not authorized to view this appointment".to_string())
            }
            other => AppError::Internal(other.to_string()),
        })?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .update_appointment(&caller, appointment_id, request, auth.token())
        .await
        .map_err(|e| match e {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            BookingError::Forbidden => {
                AppError::Forbidden("Not authorized to update this appointment".to_string())
            }
            BookingError::SlotUnavailable => {
                AppError::Conflict("Requested slot is no longer available".to_string())
            }
            BookingError::SlotConflict => {
                AppError::Conflict("Requested slot conflicts with an existing slot".to_string())
            }
            BookingError::InvalidState(msg) => {
                AppError::Conflict(format!("Invalid state transition: {}", msg))
            }
            BookingError::Database(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;
    let booking_service = BookingService::new(&state);

    booking_service
        .delete_appointment(&caller, appointment_id, auth.token())
        .await
        .map_err(|e| match e {
            BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            BookingError::Forbidden => {
                AppError::Forbidden("Only the creator may delete an appointment".to_string())
            }
            other => AppError::Internal(other.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment cancelled and slot released"
    })))
}

#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<PatientAppointmentsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;
    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .appointments_for_patient(&caller, query.date, auth.token())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "appointments": appointments
    })))
}
