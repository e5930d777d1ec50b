pub mod appointments;
pub mod chatbot;
pub mod health;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/chatbot/start", post(chatbot::start))
        .route("/chatbot/interact", post(chatbot::interact))
        .route("/api/providers", get(appointments::list_providers))
        .route("/api/providers/:id/slots", get(appointments::list_slots))
        .route(
            "/api/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            "/api/appointments/:id/reschedule",
            post(appointments::reschedule_appointment),
        )
        .route(
            "/api/appointments/:id/cancel",
            post(appointments::cancel_appointment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
