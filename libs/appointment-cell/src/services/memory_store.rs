use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use doctor_cell::{BlackoutDate, Doctor, WorkingHoursPolicy};

use crate::models::{Appointment, AppointmentStatus, NewAppointment, Visit};
use crate::services::store::{SchedulingStore, StoreError};

#[derive(Default)]
struct MemoryState {
    doctors: HashMap<Uuid, Doctor>,
    working_hours: Vec<WorkingHoursPolicy>,
    blackout_dates: Vec<BlackoutDate>,
    appointments: HashMap<Uuid, Appointment>,
    visits: Vec<Visit>,
}

/// Process-local store for development and tests.
///
/// Every write runs under a single lock, which makes the overlap check in
/// `insert_appointment` atomic with the insert and the visit check atomic
/// with a cancellation.
#[derive(Default)]
pub struct InMemorySchedulingStore {
    state: RwLock<MemoryState>,
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_doctor(&self, doctor: Doctor) {
        self.state.write().await.doctors.insert(doctor.id, doctor);
    }

    pub async fn add_working_hours(&self, policy: WorkingHoursPolicy) {
        self.state.write().await.working_hours.push(policy);
    }

    pub async fn add_blackout_date(&self, blackout: BlackoutDate) {
        self.state.write().await.blackout_dates.push(blackout);
    }

    /// Links a visit to an appointment. One visit per appointment.
    pub async fn record_visit(&self, appointment_id: Uuid) -> Result<Visit, StoreError> {
        let mut state = self.state.write().await;

        let appointment = state
            .appointments
            .get(&appointment_id)
            .ok_or_else(|| StoreError::Backend(format!("appointment {} does not exist", appointment_id)))?;
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(StoreError::Backend(format!("appointment {} is cancelled", appointment_id)));
        }
        let patient_id = appointment.patient_id;

        if state.visits.iter().any(|v| v.appointment_id == appointment_id) {
            return Err(StoreError::Conflict);
        }

        let visit = Visit {
            id: Uuid::new_v4(),
            appointment_id,
            patient_id,
            created_at: Utc::now(),
        };
        state.visits.push(visit.clone());
        Ok(visit)
    }
}

#[async_trait]
impl SchedulingStore for InMemorySchedulingStore {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, StoreError> {
        Ok(self.state.read().await.doctors.get(&doctor_id).cloned())
    }

    async fn find_doctors_by_organisation(&self, organisation_id: Uuid) -> Result<Vec<Doctor>, StoreError> {
        let state = self.state.read().await;
        let mut doctors: Vec<Doctor> = state
            .doctors
            .values()
            .filter(|d| d.organisation_id == organisation_id && d.is_active)
            .cloned()
            .collect();
        doctors.sort_by(|a, b| (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id)));
        Ok(doctors)
    }

    async fn find_working_hours(
        &self,
        organisation_id: Uuid,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkingHoursPolicy>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .working_hours
            .iter()
            .filter(|p| {
                p.organisation_id == organisation_id
                    && p.day_of_week == day_of_week
                    && p.doctor_id.map_or(true, |id| id == doctor_id)
            })
            .cloned()
            .collect())
    }

    async fn find_blackout_dates(
        &self,
        organisation_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .blackout_dates
            .iter()
            .filter(|b| b.organisation_id == organisation_id && b.blackout_date >= from && b.blackout_date < to)
            .map(|b| b.blackout_date)
            .collect())
    }

    async fn find_appointments(
        &self,
        doctor_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        status_not_in: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        let mut appointments: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| {
                a.doctor_id == doctor_id
                    && !status_not_in.contains(&a.status)
                    && a.overlaps(range_start, range_end)
            })
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.scheduled_start);
        Ok(appointments)
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.state.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let mut state = self.state.write().await;

        let overlapping = state.appointments.values().any(|existing| {
            existing.doctor_id == appointment.doctor_id
                && existing.status.occupies_slot()
                && existing.overlaps(appointment.scheduled_start, appointment.scheduled_end)
        });
        if overlapping {
            debug!("Rejecting overlapping insert for doctor {}", appointment.doctor_id);
            return Err(StoreError::Conflict);
        }

        let now = Utc::now();
        let created = Appointment {
            id: Uuid::new_v4(),
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            organisation_id: appointment.organisation_id,
            scheduled_start: appointment.scheduled_start,
            scheduled_end: appointment.scheduled_end,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        state.appointments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut state = self.state.write().await;

        if status == AppointmentStatus::Cancelled
            && state.visits.iter().any(|v| v.appointment_id == appointment_id)
        {
            debug!("Refusing to cancel appointment {} with a visit", appointment_id);
            return Err(StoreError::VisitLinked);
        }

        match state.appointments.get_mut(&appointment_id) {
            Some(appointment) if appointment.status == expected => {
                appointment.status = status;
                appointment.updated_at = Utc::now();
                Ok(Some(appointment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn count_visits_for_appointment(&self, appointment_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        Ok(state.visits.iter().filter(|v| v.appointment_id == appointment_id).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    fn new_appointment(doctor_id: Uuid, start_hour: u32, minutes: i64) -> NewAppointment {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, start_hour, 0, 0).unwrap();
        NewAppointment {
            doctor_id,
            patient_id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            scheduled_start: start,
            scheduled_end: start + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn insert_rejects_overlap_but_allows_adjacency() {
        let store = InMemorySchedulingStore::new();
        let doctor = Uuid::new_v4();

        store.insert_appointment(new_appointment(doctor, 10, 30)).await.unwrap();
        assert_matches!(
            store.insert_appointment(new_appointment(doctor, 10, 15)).await,
            Err(StoreError::Conflict)
        );
        assert!(store.insert_appointment(new_appointment(doctor, 9, 60)).await.is_ok());
        // Another doctor is unaffected.
        assert!(store.insert_appointment(new_appointment(Uuid::new_v4(), 10, 30)).await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_appointments_free_their_interval() {
        let store = InMemorySchedulingStore::new();
        let doctor = Uuid::new_v4();

        let first = store.insert_appointment(new_appointment(doctor, 10, 30)).await.unwrap();
        store
            .update_appointment_status(first.id, AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .await
            .unwrap();

        assert!(store.insert_appointment(new_appointment(doctor, 10, 30)).await.is_ok());
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let store = InMemorySchedulingStore::new();
        let appointment = store.insert_appointment(new_appointment(Uuid::new_v4(), 10, 30)).await.unwrap();

        let stale = store
            .update_appointment_status(appointment.id, AppointmentStatus::Completed, AppointmentStatus::Cancelled)
            .await
            .unwrap();
        assert!(stale.is_none());

        let updated = store
            .update_appointment_status(appointment.id, AppointmentStatus::Scheduled, AppointmentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(updated.map(|a| a.status), Some(AppointmentStatus::Completed));
    }

    #[tokio::test]
    async fn cancel_with_visit_is_refused_under_the_write_lock() {
        let store = InMemorySchedulingStore::new();
        let appointment = store.insert_appointment(new_appointment(Uuid::new_v4(), 10, 30)).await.unwrap();
        store.record_visit(appointment.id).await.unwrap();

        assert_matches!(
            store
                .update_appointment_status(appointment.id, AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
                .await,
            Err(StoreError::VisitLinked)
        );
        let stored = store.find_appointment(appointment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Scheduled);
    }

    #[tokio::test]
    async fn one_visit_per_appointment() {
        let store = InMemorySchedulingStore::new();
        let appointment = store.insert_appointment(new_appointment(Uuid::new_v4(), 10, 30)).await.unwrap();

        store.record_visit(appointment.id).await.unwrap();
        assert_matches!(store.record_visit(appointment.id).await, Err(StoreError::Conflict));
        assert_eq!(store.count_visits_for_appointment(appointment.id).await.unwrap(), 1);
    }
}
