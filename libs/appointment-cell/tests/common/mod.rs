#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::{BookAppointmentRequest, InMemorySchedulingStore, SchedulingState, SchedulingStore};
use doctor_cell::{BreakInterval, Doctor, WorkingHoursPolicy};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_utils::test_utils::{TestConfig, TestUser};

pub const MONDAY: u32 = 1; // 2024-01-01

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn doctor(organisation_id: Uuid, last_name: &str) -> Doctor {
    Doctor {
        id: Uuid::new_v4(),
        organisation_id,
        first_name: "Test".to_string(),
        last_name: last_name.to_string(),
        is_active: true,
    }
}

pub fn policy(
    organisation_id: Uuid,
    doctor_id: Option<Uuid>,
    day_of_week: i32,
    hours: (NaiveTime, NaiveTime),
    slot_duration_minutes: i32,
    breaks: Vec<BreakInterval>,
) -> WorkingHoursPolicy {
    WorkingHoursPolicy {
        id: Uuid::new_v4(),
        organisation_id,
        doctor_id,
        day_of_week,
        start_time: hours.0,
        end_time: hours.1,
        slot_duration_minutes,
        breaks,
    }
}

pub fn booking(doctor_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id,
        patient_id: Uuid::new_v4(),
        start,
        end,
    }
}

/// One organisation with one active doctor working Mondays 09:00-12:00 in
/// 30 minute slots, served from the in-memory store.
pub struct Clinic {
    pub store: Arc<InMemorySchedulingStore>,
    pub state: Arc<SchedulingState>,
    pub config: Arc<AppConfig>,
    pub organisation_id: Uuid,
    pub doctor: Doctor,
    pub staff: TestUser,
}

impl Clinic {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default().to_app_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let organisation_id = Uuid::new_v4();
        let store = Arc::new(InMemorySchedulingStore::new());
        let doctor = doctor(organisation_id, "House");

        store.add_doctor(doctor.clone()).await;
        store
            .add_working_hours(policy(organisation_id, None, 1, (time(9, 0), time(12, 0)), 30, vec![]))
            .await;

        let config = Arc::new(config);
        let dyn_store: Arc<dyn SchedulingStore> = store.clone();
        let state = Arc::new(SchedulingState::new(config.clone(), dyn_store));

        Self {
            store,
            state,
            config,
            organisation_id,
            doctor,
            staff: TestUser::staff(organisation_id),
        }
    }

    pub fn caller(&self) -> User {
        self.staff.to_user()
    }

    pub fn outsider(&self) -> User {
        TestUser::staff(Uuid::new_v4()).to_user()
    }
}
