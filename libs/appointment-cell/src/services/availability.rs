// libs/appointment-cell/src/services/availability.rs
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{Days, NaiveDate, NaiveTime, Utc};
use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{day_of_week_for, Doctor, TimeGridBuilder, WeeklySchedule};
use shared_config::SchedulingConfig;
use shared_models::auth::User;
use shared_utils::tenant::TenantGuard;

use crate::models::{
    AppointmentError, AppointmentStatus, AvailabilityQuery, AvailabilityResponse, DoctorSlots,
};
use crate::services::cache::{AvailabilityCache, CacheKey};
use crate::services::conflict::ConflictDetectionService;
use crate::services::store::{with_timeout, SchedulingStore};

/// Resolved, validated date range of an availability request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub organisation_id: Uuid,
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
}

impl AvailabilityWindow {
    /// First day after the window; the grid covers `[start_date, end_exclusive)`.
    pub fn end_exclusive(&self) -> Result<NaiveDate, AppointmentError> {
        self.end_date
            .succ_opt()
            .ok_or_else(|| AppointmentError::ValidationError("endDate is out of range".to_string()))
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            organisation_id: self.organisation_id,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

pub struct AvailabilityService {
    store: Arc<dyn SchedulingStore>,
    cache: Arc<AvailabilityCache>,
    grid: TimeGridBuilder,
    config: SchedulingConfig,
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        cache: Arc<AvailabilityCache>,
        config: SchedulingConfig,
    ) -> Self {
        Self { store, cache, grid: TimeGridBuilder::new(), config }
    }

    /// Open slots of every active doctor in the organisation, grouped by doctor.
    #[instrument(skip(self, caller, query), fields(caller = %caller.id))]
    pub async fn get_availability(
        &self,
        caller: &User,
        query: AvailabilityQuery,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        let window = self.resolve_window(&query, Utc::now().date_naive())?;
        TenantGuard::check(caller.organisation_id, window.organisation_id, "organisation")?;

        let key = window.cache_key();
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }
        let generation = self.cache.generation(window.organisation_id).await;

        let response = self.compute(window).await?;

        info!(
            "Computed {} open slots across {} doctors for organisation {} ({} to {})",
            response.total_slots,
            response.doctors.len(),
            window.organisation_id,
            window.start_date,
            window.end_date
        );

        self.cache.put(key, response.clone(), generation).await;
        Ok(response)
    }

    /// Applies defaults and range limits. `today` is the UTC calendar date.
    pub fn resolve_window(
        &self,
        query: &AvailabilityQuery,
        today: NaiveDate,
    ) -> Result<AvailabilityWindow, AppointmentError> {
        let organisation_id = query
            .organisation_id
            .ok_or_else(|| AppointmentError::ValidationError("organisation_id is required".to_string()))?;

        let start_date = query.start_date.unwrap_or(today);
        let end_date = match query.end_date {
            Some(end) => end,
            None => {
                let extra_days = self.config.availability_window_days.max(1) - 1;
                start_date
                    .checked_add_days(Days::new(extra_days as u64))
                    .ok_or_else(|| AppointmentError::ValidationError("startDate is out of range".to_string()))?
            }
        };

        if end_date < start_date {
            return Err(AppointmentError::ValidationError(
                "endDate must not be before startDate".to_string(),
            ));
        }

        let span_days = (end_date - start_date).num_days() + 1;
        if span_days > self.config.availability_max_range_days as i64 {
            warn!("Rejecting availability range of {} days", span_days);
            return Err(AppointmentError::ValidationError(format!(
                "Date range may span at most {} days",
                self.config.availability_max_range_days
            )));
        }

        Ok(AvailabilityWindow { organisation_id, start_date, end_date })
    }

    async fn compute(&self, window: AvailabilityWindow) -> Result<AvailabilityResponse, AppointmentError> {
        let timeout = self.config.storage_timeout();
        let end_exclusive = window.end_exclusive()?;

        let closed_days: HashSet<NaiveDate> = with_timeout(
            timeout,
            "find_blackout_dates",
            self.store.find_blackout_dates(window.organisation_id, window.start_date, end_exclusive),
        )
        .await?
        .into_iter()
        .collect();

        let doctors = with_timeout(
            timeout,
            "find_doctors_by_organisation",
            self.store.find_doctors_by_organisation(window.organisation_id),
        )
        .await?;

        debug!(
            "Computing availability for {} doctors with {} closed days",
            doctors.len(),
            closed_days.len()
        );

        let doctors = try_join_all(
            doctors
                .iter()
                .map(|doctor| self.doctor_slots(doctor, &window, end_exclusive, &closed_days)),
        )
        .await?;

        let total_slots = doctors.iter().map(|d| d.slots.len()).sum();
        Ok(AvailabilityResponse {
            organisation_id: window.organisation_id,
            start_date: window.start_date,
            end_date: window.end_date,
            doctors,
            total_slots,
        })
    }

    async fn doctor_slots(
        &self,
        doctor: &Doctor,
        window: &AvailabilityWindow,
        end_exclusive: NaiveDate,
        closed_days: &HashSet<NaiveDate>,
    ) -> Result<DoctorSlots, AppointmentError> {
        let timeout = self.config.storage_timeout();

        let weekdays: BTreeSet<i32> = window
            .start_date
            .iter_days()
            .take_while(|day| *day < end_exclusive)
            .take(7)
            .map(day_of_week_for)
            .collect();

        let policies = try_join_all(weekdays.into_iter().map(|day_of_week| {
            with_timeout(
                timeout,
                "find_working_hours",
                self.store.find_working_hours(window.organisation_id, doctor.id, day_of_week),
            )
        }))
        .await?;

        let schedule = WeeklySchedule::resolve(doctor.id, policies.into_iter().flatten()).map_err(|e| {
            warn!("Working hours of doctor {} are inconsistent: {}", doctor.id, e);
            AppointmentError::ServerError(format!("Working hours for doctor {} are inconsistent", doctor.id))
        })?;

        let candidates = self.grid.build(doctor.id, &schedule, window.start_date, end_exclusive, closed_days);

        let range_start = window.start_date.and_time(NaiveTime::MIN).and_utc();
        let range_end = end_exclusive.and_time(NaiveTime::MIN).and_utc();
        let booked = with_timeout(
            timeout,
            "find_appointments",
            self.store.find_appointments(doctor.id, range_start, range_end, &[AppointmentStatus::Cancelled]),
        )
        .await?;

        Ok(DoctorSlots {
            doctor_id: doctor.id,
            doctor_name: doctor.full_name(),
            slots: ConflictDetectionService::filter_available(candidates, &booked),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::InMemorySchedulingStore;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn service() -> AvailabilityService {
        AvailabilityService::new(
            Arc::new(InMemorySchedulingStore::new()),
            Arc::new(AvailabilityCache::new(Duration::ZERO)),
            SchedulingConfig::default(),
        )
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn query(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AvailabilityQuery {
        AvailabilityQuery { organisation_id: Some(Uuid::new_v4()), start_date: start, end_date: end }
    }

    #[test]
    fn window_defaults_to_seven_days_from_today() {
        let window = service().resolve_window(&query(None, None), date(1, 1)).unwrap();
        assert_eq!(window.start_date, date(1, 1));
        assert_eq!(window.end_date, date(1, 7));
        assert_eq!(window.end_exclusive().unwrap(), date(1, 8));
    }

    #[test]
    fn single_day_window_is_allowed() {
        let window = service()
            .resolve_window(&query(Some(date(1, 3)), Some(date(1, 3))), date(1, 1))
            .unwrap();
        assert_eq!(window.end_exclusive().unwrap(), date(1, 4));
    }

    #[test]
    fn rejects_missing_organisation_and_inverted_or_oversized_ranges() {
        let svc = service();
        let today = date(1, 1);

        let missing_org = AvailabilityQuery { organisation_id: None, ..query(None, None) };
        assert_matches!(svc.resolve_window(&missing_org, today), Err(AppointmentError::ValidationError(_)));

        assert_matches!(
            svc.resolve_window(&query(Some(date(1, 5)), Some(date(1, 4))), today),
            Err(AppointmentError::ValidationError(_))
        );

        // 62 days is the limit, 63 is not.
        assert!(svc.resolve_window(&query(Some(date(1, 1)), Some(date(3, 2))), today).is_ok());
        assert_matches!(
            svc.resolve_window(&query(Some(date(1, 1)), Some(date(3, 3))), today),
            Err(AppointmentError::ValidationError(_))
        );
    }
}
