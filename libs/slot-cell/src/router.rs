// libs/slot-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn slot_routes(state: Arc<AppConfig>) -> Router {
    // All slot operations require authentication
    let protected_routes = Router::new()
        .route("/generate", post(handlers::generate_slots))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_slots))
        .route("/doctors/{doctor_id}/free", get(handlers::get_doctor_free_slots))
        .route("/specialties/{specialty_id}", get(handlers::search_by_specialty))
        .route("/cancel", post(handlers::cancel_slots))
        .route("/cancel-by-date", post(handlers::cancel_slots_by_date))
        .route("/{slot_id}/shift", patch(handlers::shift_slot))
        .route("/{slot_id}/delivery-mode", patch(handlers::convert_delivery_mode))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
