use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::{BlackoutDate, Doctor, WorkingHoursPolicy};
use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentStatus, NewAppointment};
use crate::services::store::{SchedulingStore, StoreError};

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Conflict(_) => StoreError::Conflict,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// PostgREST-backed store. Double-booking protection comes from the
/// exclusion constraint on `appointments` (see `migrations/`).
pub struct SupabaseSchedulingStore {
    supabase: SupabaseClient,
    service_key: String,
}

impl SupabaseSchedulingStore {
    pub fn new(config: &AppConfig) -> Result<Self, StoreError> {
        Ok(Self {
            supabase: SupabaseClient::new(config)?,
            service_key: config.supabase_service_role_key.clone(),
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(&self.service_key),
            None,
        ).await?;

        decode_rows(rows)
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| StoreError::Backend(format!("Failed to parse rows: {}", e)))
}

/// Full-precision RFC 3339 for JSON bodies.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Full-precision RFC 3339 for query filters. The offset's '+' would decode
/// as a space if left unencoded.
fn timestamp_filter(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339()).into_owned()
}

/// Set by the `appointments_guard_cancel` trigger in `migrations/`.
const VISIT_LINKED_MARKER: &str = "appointment_has_visit";

fn status_update_error(err: SupabaseError) -> StoreError {
    match err {
        SupabaseError::Api { ref message, .. } if message.contains(VISIT_LINKED_MARKER) => StoreError::VisitLinked,
        other => StoreError::from(other),
    }
}

#[async_trait]
impl SchedulingStore for SupabaseSchedulingStore {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, StoreError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&limit=1", doctor_id);
        let doctors: Vec<Doctor> = self.fetch(&path).await?;
        Ok(doctors.into_iter().next())
    }

    async fn find_doctors_by_organisation(&self, organisation_id: Uuid) -> Result<Vec<Doctor>, StoreError> {
        let path = format!(
            "/rest/v1/doctors?organisation_id=eq.{}&is_active=eq.true&order=last_name.asc,first_name.asc",
            organisation_id
        );
        self.fetch(&path).await
    }

    async fn find_working_hours(
        &self,
        organisation_id: Uuid,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<WorkingHoursPolicy>, StoreError> {
        let path = format!(
            "/rest/v1/working_hours?organisation_id=eq.{}&day_of_week=eq.{}&or=(doctor_id.eq.{},doctor_id.is.null)&order=start_time.asc",
            organisation_id, day_of_week, doctor_id
        );
        self.fetch(&path).await
    }

    async fn find_blackout_dates(
        &self,
        organisation_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let path = format!(
            "/rest/v1/organisation_blackout_dates?organisation_id=eq.{}&blackout_date=gte.{}&blackout_date=lt.{}",
            organisation_id, from, to
        );
        let rows: Vec<BlackoutDate> = self.fetch(&path).await?;
        Ok(rows.into_iter().map(|b| b.blackout_date).collect())
    }

    async fn find_appointments(
        &self,
        doctor_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        status_not_in: &[AppointmentStatus],
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&scheduled_start=lt.{}&scheduled_end=gt.{}",
            doctor_id,
            timestamp_filter(range_end),
            timestamp_filter(range_start)
        );

        if !status_not_in.is_empty() {
            let excluded: Vec<&str> = status_not_in.iter().map(AppointmentStatus::as_str).collect();
            path.push_str(&format!("&status=not.in.({})", excluded.join(",")));
        }
        path.push_str("&order=scheduled_start.asc");

        self.fetch(&path).await
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&limit=1", appointment_id);
        let appointments: Vec<Appointment> = self.fetch(&path).await?;
        Ok(appointments.into_iter().next())
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let now = timestamp(Utc::now());
        let body = json!({
            "id": Uuid::new_v4(),
            "doctor_id": appointment.doctor_id,
            "patient_id": appointment.patient_id,
            "organisation_id": appointment.organisation_id,
            "scheduled_start": timestamp(appointment.scheduled_start),
            "scheduled_end": timestamp(appointment.scheduled_end),
            "status": AppointmentStatus::Scheduled,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(&self.service_key),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await.map_err(|e| {
            if matches!(e, SupabaseError::Conflict(_)) {
                warn!("Exclusion constraint rejected booking for doctor {}", appointment.doctor_id);
            }
            StoreError::from(e)
        })?;

        decode_rows::<Appointment>(result)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("Insert returned no appointment".to_string()))
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> Result<Option<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id,
            expected.as_str()
        );
        let body = json!({
            "status": status,
            "updated_at": timestamp(Utc::now())
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(&self.service_key),
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await.map_err(|e| {
            let err = status_update_error(e);
            if err == StoreError::VisitLinked {
                warn!("Trigger refused to cancel appointment {} with a visit", appointment_id);
            }
            err
        })?;

        let updated = decode_rows::<Appointment>(result)?.into_iter().next();
        if updated.is_none() {
            debug!("Status of appointment {} no longer {}", appointment_id, expected);
        }
        Ok(updated)
    }

    async fn count_visits_for_appointment(&self, appointment_id: Uuid) -> Result<i64, StoreError> {
        let path = format!("/rest/v1/visits?appointment_id=eq.{}&select=id", appointment_id);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.service_key),
            None,
        ).await?;
        Ok(rows.len() as i64)
    }
}
