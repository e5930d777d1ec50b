use std::sync::{Arc, PoisonError};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, DATE_FORMAT, TIME_FORMAT};
use crate::errors::AppError;
use crate::models::{AppointmentSummary, AppointmentType, ProviderOption, SlotOption};
use crate::services::booking::{self, ReserveRequest};
use crate::services::identity::Claims;
use crate::services::notify::{self, AppointmentEvent, EventKind};
use crate::state::AppState;

// Bearer credential from the end of chat verification.
fn authorize(headers: &HeaderMap, state: &AppState) -> Result<Claims, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = state.credentials.verify(token).map_err(|e| {
        tracing::debug!("rejected credential: {e}");
        AppError::Unauthorized
    })?;

    if !claims.role.can_book() {
        return Err(AppError::Unauthorized);
    }
    Ok(claims)
}

#[derive(Serialize)]
pub struct SlotResponse {
    id: i64,
    date: String,
    start_time: String,
    label: String,
}

impl From<&SlotOption> for SlotResponse {
    fn from(slot: &SlotOption) -> Self {
        Self {
            id: slot.id,
            date: slot.date.format(DATE_FORMAT).to_string(),
            start_time: slot.start_time.format(TIME_FORMAT).to_string(),
            label: slot.start_label(),
        }
    }
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    id: String,
    provider_id: i64,
    provider_name: String,
    date: String,
    start_time: String,
    appointment_type: &'static str,
    reason: String,
    status: &'static str,
}

impl From<AppointmentSummary> for AppointmentResponse {
    fn from(a: AppointmentSummary) -> Self {
        Self {
            start_time: a.label(),
            date: a.date.format(DATE_FORMAT).to_string(),
            appointment_type: a.appointment_type.as_str(),
            status: a.status.as_str(),
            id: a.id,
            provider_id: a.provider_id,
            provider_name: a.provider_name,
            reason: a.reason,
        }
    }
}

fn notify_change(state: &AppState, kind: EventKind, summary: &AppointmentSummary, subject_id: i64) {
    notify::dispatch(
        &state.notifier,
        AppointmentEvent {
            kind,
            appointment_id: summary.id.clone(),
            subject_id,
            provider_name: summary.provider_name.clone(),
            date: summary.date,
            time: summary.label(),
        },
    );
}

// GET /api/providers
#[derive(Serialize)]
pub struct ProviderResponse {
    id: i64,
    name: String,
    next_open: Option<SlotResponse>,
}

impl From<ProviderOption> for ProviderResponse {
    fn from(p: ProviderOption) -> Self {
        Self {
            next_open: p.next_open.as_ref().map(SlotResponse::from),
            id: p.id,
            name: p.name,
        }
    }
}

pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProviderResponse>>, AppError> {
    authorize(&headers, &state)?;

    let now = Local::now().naive_local();
    let providers = {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::providers_with_availability(&db, &now)?
    };

    Ok(Json(providers.into_iter().map(ProviderResponse::from).collect()))
}

// GET /api/providers/:id/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: Option<String>,
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(provider_id): Path<i64>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotResponse>>, AppError> {
    authorize(&headers, &state)?;

    let on = query
        .date
        .as_deref()
        .map(|d| NaiveDate::parse_from_str(d, DATE_FORMAT))
        .transpose()
        .map_err(|_| AppError::BadRequest("date must be YYYY-MM-DD".to_string()))?;

    let now = Local::now().naive_local();
    let slots = {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        match on {
            Some(on) => queries::open_slots_on(&db, provider_id, on, &now)?,
            None => queries::upcoming_open_slots(&db, provider_id, &now)?,
        }
    };

    Ok(Json(slots.iter().map(SlotResponse::from).collect()))
}

// GET /api/appointments
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<AppointmentResponse>>, AppError> {
    let claims = authorize(&headers, &state)?;

    let now = Local::now().naive_local();
    let appointments = {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::upcoming_appointments(&db, claims.subject, &now)?
    };

    Ok(Json(
        appointments
            .into_iter()
            .map(AppointmentResponse::from)
            .collect(),
    ))
}

// POST /api/appointments
#[derive(Deserialize)]
pub struct CreateAppointmentRequest {
    pub slot_id: i64,
    pub appointment_type: String,
    pub reason: String,
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let claims = authorize(&headers, &state)?;

    let appointment_type = AppointmentType::parse(&req.appointment_type).ok_or_else(|| {
        AppError::BadRequest("appointment_type must be 'virtual' or 'in_person'".to_string())
    })?;
    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(AppError::BadRequest("reason is required".to_string()));
    }

    let request = ReserveRequest {
        slot_id: req.slot_id,
        subject_id: claims.subject,
        requester_id: claims.requester,
        appointment_type,
        reason: reason.to_string(),
    };

    let summary = {
        let mut db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        let id = booking::reserve(&mut db, &request)?;
        queries::get_appointment_summary(&db, &id)?
    }
    .ok_or_else(|| AppError::NotFound("appointment".to_string()))?;

    notify_change(&state, EventKind::Booked, &summary, claims.subject);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": summary.id})),
    ))
}

// Only appointments of the credential's subject.
fn owned_summary(
    state: &AppState,
    claims: &Claims,
    id: &str,
) -> Result<AppointmentSummary, AppError> {
    let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
    let owned = queries::get_appointment(&db, id)?
        .is_some_and(|a| a.subject_id == claims.subject);
    if !owned {
        return Err(AppError::NotFound("appointment not found".to_string()));
    }
    queries::get_appointment_summary(&db, id)?
        .ok_or_else(|| AppError::NotFound("appointment not found".to_string()))
}

// POST /api/appointments/:id/reschedule
#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub slot_id: i64,
}

pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<AppointmentResponse>, AppError> {
    let claims = authorize(&headers, &state)?;
    owned_summary(&state, &claims, &id)?;

    let summary = {
        let mut db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        booking::reschedule(&mut db, &id, req.slot_id, None)?;
        queries::get_appointment_summary(&db, &id)?
    }
    .ok_or_else(|| AppError::NotFound("appointment not found".to_string()))?;

    notify_change(&state, EventKind::Rescheduled, &summary, claims.subject);

    Ok(Json(AppointmentResponse::from(summary)))
}

// POST /api/appointments/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let claims = authorize(&headers, &state)?;
    let summary = owned_summary(&state, &claims, &id)?;

    {
        let mut db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        booking::cancel(&mut db, &id)?;
    }

    notify_change(&state, EventKind::Cancelled, &summary, claims.subject);

    Ok(Json(serde_json::json!({"ok": true})))
}
