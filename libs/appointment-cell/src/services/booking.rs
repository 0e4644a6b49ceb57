// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_models::auth::User;
use shared_utils::tenant::TenantGuard;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, NewAppointment,
};
use crate::services::cache::AvailabilityCache;
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::{AppointmentLifecycleService, TransitionDecision};
use crate::services::store::{with_timeout, SchedulingStore};

/// Write side of scheduling: booking and status changes.
///
/// Never reads from the availability cache; every decision is made against
/// the store.
pub struct AppointmentBookingService {
    store: Arc<dyn SchedulingStore>,
    cache: Arc<AvailabilityCache>,
    lifecycle_service: AppointmentLifecycleService,
    config: SchedulingConfig,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        cache: Arc<AvailabilityCache>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            store,
            cache,
            lifecycle_service: AppointmentLifecycleService::new(),
            config,
        }
    }

    #[instrument(skip(self, caller, request), fields(caller = %caller.id, doctor_id = %request.doctor_id))]
    pub async fn book_appointment(
        &self,
        caller: &User,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {}", request.patient_id, request.doctor_id);

        self.validate_booking_window(request.start, request.end)?;

        let timeout = self.config.storage_timeout();
        let doctor = with_timeout(timeout, "find_doctor", self.store.find_doctor(request.doctor_id)).await?;
        let doctor = TenantGuard::scope(caller.organisation_id, doctor, |d| d.organisation_id, "doctor")?;

        if !doctor.is_active {
            return Err(AppointmentError::ValidationError(format!(
                "Doctor {} is not accepting appointments",
                doctor.id
            )));
        }

        let existing = with_timeout(
            timeout,
            "find_appointments",
            self.store.find_appointments(doctor.id, request.start, request.end, &[AppointmentStatus::Cancelled]),
        )
        .await?;

        let conflicts = ConflictDetectionService::find_conflicts(request.start, request.end, &existing);
        if !conflicts.is_empty() {
            warn!(
                "Appointment conflict detected for doctor {} at {} ({} overlapping)",
                doctor.id,
                request.start,
                conflicts.len()
            );
            return Err(AppointmentError::ConflictDetected);
        }

        // The store repeats the overlap check atomically with the insert.
        let appointment = with_timeout(
            timeout,
            "insert_appointment",
            self.store.insert_appointment(NewAppointment {
                doctor_id: doctor.id,
                patient_id: request.patient_id,
                organisation_id: doctor.organisation_id,
                scheduled_start: request.start,
                scheduled_end: request.end,
            }),
        )
        .await?;

        self.invalidate_availability(&appointment).await;

        info!("Appointment {} booked successfully with doctor {}", appointment.id, doctor.id);
        Ok(appointment)
    }

    /// Moves an appointment to `status_text`. Requesting the current status
    /// succeeds without writing.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn transition_appointment(
        &self,
        caller: &User,
        appointment_id: Uuid,
        status_text: &str,
    ) -> Result<Appointment, AppointmentError> {
        let target: AppointmentStatus = status_text.parse()?;
        let timeout = self.config.storage_timeout();

        let mut current = self.get_appointment(caller, appointment_id).await?;

        // One re-read and re-evaluation if a concurrent writer got there first.
        for attempt in 0..2 {
            let decision = self.lifecycle_service.validate_status_transition(current.status, target)?;

            let requires_no_visit = match decision {
                TransitionDecision::NoOp => {
                    debug!("Appointment {} already {}", appointment_id, target);
                    return Ok(current);
                }
                TransitionDecision::Apply { requires_no_visit } => requires_no_visit,
            };

            // Early exit only; the store refuses the cancel atomically if a
            // visit lands in between.
            if requires_no_visit {
                let visits = with_timeout(
                    timeout,
                    "count_visits_for_appointment",
                    self.store.count_visits_for_appointment(appointment_id),
                )
                .await?;
                self.lifecycle_service.ensure_cancellable(visits).map_err(|e| {
                    warn!("Refusing to cancel appointment {} with {} visit(s)", appointment_id, visits);
                    e
                })?;
            }

            let updated = with_timeout(
                timeout,
                "update_appointment_status",
                self.store.update_appointment_status(appointment_id, current.status, target),
            )
            .await?;

            if let Some(updated) = updated {
                self.invalidate_availability(&updated).await;
                info!("Appointment {} moved from {} to {}", appointment_id, current.status, target);
                return Ok(updated);
            }

            debug!("Status of appointment {} changed concurrently (attempt {})", appointment_id, attempt + 1);
            current = self.get_appointment(caller, appointment_id).await?;
        }

        Err(AppointmentError::ServerError(format!(
            "Appointment {} kept changing during the status update",
            appointment_id
        )))
    }

    /// Tenant-scoped read of a single appointment.
    pub async fn get_appointment(
        &self,
        caller: &User,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let appointment = with_timeout(
            self.config.storage_timeout(),
            "find_appointment",
            self.store.find_appointment(appointment_id),
        )
        .await?;

        Ok(TenantGuard::scope(caller.organisation_id, appointment, |a| a.organisation_id, "appointment")?)
    }

    fn validate_booking_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppointmentError> {
        if start >= end {
            return Err(AppointmentError::ValidationError(
                "Appointment start must be before its end".to_string(),
            ));
        }

        let minutes = (end - start).num_minutes();
        if minutes > self.config.max_appointment_minutes {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment may last at most {} minutes",
                self.config.max_appointment_minutes
            )));
        }

        Ok(())
    }

    async fn invalidate_availability(&self, appointment: &Appointment) {
        self.cache
            .invalidate(
                appointment.organisation_id,
                appointment.scheduled_start.date_naive(),
                appointment.scheduled_end.date_naive(),
            )
            .await;
    }
}
