// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AvailabilityQuery, AvailabilityResponse, BookAppointmentRequest,
    UpdateAppointmentStatusRequest,
};
use crate::router::SchedulingState;

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::ValidationError(e.body_text()))?;

    let availability = state.availability.get_availability(&user, query).await?;
    Ok(Json(availability))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    request: Result<Json<BookAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let Json(request) = request.map_err(|e| AppError::ValidationError(e.body_text()))?;

    let appointment = state.booking.book_appointment(&user, request).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    appointment_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Appointment>, AppError> {
    let Path(appointment_id) = appointment_id.map_err(|e| AppError::ValidationError(e.body_text()))?;

    let appointment = state.booking.get_appointment(&user, appointment_id).await?;
    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    appointment_id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<UpdateAppointmentStatusRequest>, JsonRejection>,
) -> Result<Json<Appointment>, AppError> {
    let Path(appointment_id) = appointment_id.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let Json(request) = request.map_err(|e| AppError::ValidationError(e.body_text()))?;

    let appointment = state
        .booking
        .transition_appointment(&user, appointment_id, &request.status)
        .await?;
    Ok(Json(appointment))
}
