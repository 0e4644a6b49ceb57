use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use doctor_cell::{Doctor, WorkingHoursPolicy};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, NewAppointment};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The write would overlap a non-cancelled appointment of the same doctor.
    #[error("Overlapping appointment exists for doctor")]
    Conflict,

    /// Cancellation refused because a visit references the appointment.
    #[error("Appointment has an associated visit")]
    VisitLinked,

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppointmentError::ConflictDetected,
            StoreError::VisitLinked => AppointmentError::InvariantViolation(
                "cannot cancel an appointment with an associated visit".to_string(),
            ),
            StoreError::Backend(msg) => AppointmentError::ServerError(msg),
        }
    }
}

/// Persistence boundary of the scheduling core.
///
/// `insert_appointment` must reject overlapping non-cancelled appointments
/// atomically; the in-process conflict check only shortens the common path.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, StoreError>;

    /// Active doctors only.
    async fn find_doctors_by_organisation(&self, organisation_id: Uuid) -> Result<Vec<Doctor>, StoreError>;

    /// The doctor's own entries plus the organisation-wide entries for the weekday.
    async fn find_working_hours(
        &self,
        organisation_id: Uuid,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkingHoursPolicy>, StoreError>;

    /// Closed days in `[from, to)`.
    async fn find_blackout_dates(
        &self,
        organisation_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError>;

    /// Appointments of the doctor intersecting `[range_start, range_end)`,
    /// ordered by start, skipping the listed statuses.
    async fn find_appointments(
        &self,
        doctor_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        status_not_in: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError>;

    /// Compare-and-set on the status. `None` when the stored status is no
    /// longer `expected` (or the appointment vanished).
    ///
    /// Moving to `Cancelled` must fail with `StoreError::VisitLinked` if a
    /// visit references the appointment, checked atomically with the write.
    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, StoreError>;

    async fn count_visits_for_appointment(&self, appointment_id: Uuid) -> Result<i64, StoreError>;
}

/// Runs a storage call under the request deadline.
pub async fn with_timeout<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, AppointmentError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(StoreError::Backend(msg))) => {
            error!("Storage call {} failed: {}", operation, msg);
            Err(AppointmentError::ServerError(format!("{} failed", operation)))
        }
        Ok(Err(err)) => Err(err.into()),
        Err(_) => {
            error!("Storage call {} timed out after {:?}", operation, timeout);
            Err(AppointmentError::ServerError(format!("{} timed out", operation)))
        }
    }
}
