use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use crate::models::{day_of_week_for, AvailabilitySlot, PolicyError, WorkingHoursPolicy};

/// Working hours of one doctor, resolved per weekday.
///
/// For each weekday the doctor's own entries win; the organisation-wide
/// entries apply only when the doctor has none for that day.
#[derive(Debug, Clone, Default)]
pub struct WeeklySchedule {
    days: BTreeMap<i32, Vec<WorkingHoursPolicy>>,
}

impl WeeklySchedule {
    pub fn resolve(
        doctor_id: Uuid,
        policies: impl IntoIterator<Item = WorkingHoursPolicy>,
    ) -> Result<Self, PolicyError> {
        let mut doctor_days: BTreeMap<i32, Vec<WorkingHoursPolicy>> = BTreeMap::new();
        let mut organisation_days: BTreeMap<i32, Vec<WorkingHoursPolicy>> = BTreeMap::new();

        for policy in policies {
            policy.validate()?;
            match policy.doctor_id {
                Some(id) if id == doctor_id => {
                    doctor_days.entry(policy.day_of_week).or_default().push(policy)
                }
                Some(_) => continue,
                None => organisation_days.entry(policy.day_of_week).or_default().push(policy),
            }
        }

        let mut days = organisation_days;
        days.extend(doctor_days);

        for (day, entries) in days.iter_mut() {
            entries.sort_by_key(|p| p.start_time);
            for pair in entries.windows(2) {
                if pair[1].start_time < pair[0].end_time {
                    return Err(PolicyError::OverlappingPolicies {
                        first: pair[0].id,
                        second: pair[1].id,
                        day_of_week: *day,
                    });
                }
            }
        }

        Ok(Self { days })
    }

    pub fn for_day(&self, day_of_week: i32) -> &[WorkingHoursPolicy] {
        self.days.get(&day_of_week).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Expands a [`WeeklySchedule`] into candidate slots over a date range.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeGridBuilder;

impl TimeGridBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Candidate slots for every day in `[from, to)`.
    ///
    /// Each free segment (working hours minus breaks) is cut into slots of the
    /// policy's duration starting at the segment's start; a shorter trailing
    /// remainder is dropped. Days in `closed_days` and weekdays without a
    /// policy yield nothing.
    pub fn build(
        &self,
        doctor_id: Uuid,
        schedule: &WeeklySchedule,
        from: NaiveDate,
        to: NaiveDate,
        closed_days: &HashSet<NaiveDate>,
    ) -> Vec<AvailabilitySlot> {
        let mut slots = Vec::new();

        for day in from.iter_days().take_while(|day| *day < to) {
            if closed_days.contains(&day) {
                debug!("Skipping closed day {} for doctor {}", day, doctor_id);
                continue;
            }

            for policy in schedule.for_day(day_of_week_for(day)) {
                Self::partition_day(doctor_id, policy, day, &mut slots);
            }
        }

        debug!("Built {} candidate slots for doctor {} between {} and {}",
               slots.len(), doctor_id, from, to);
        slots
    }

    fn partition_day(
        doctor_id: Uuid,
        policy: &WorkingHoursPolicy,
        day: NaiveDate,
        slots: &mut Vec<AvailabilitySlot>,
    ) {
        let slot_length = Duration::minutes(policy.slot_duration_minutes as i64);

        for (segment_start, segment_end) in policy.free_segments() {
            let segment_end = day.and_time(segment_end).and_utc();
            let mut current = day.and_time(segment_start).and_utc();

            while current + slot_length <= segment_end {
                slots.push(AvailabilitySlot {
                    doctor_id,
                    start: current,
                    end: current + slot_length,
                });
                current += slot_length;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BreakInterval;
    use assert_matches::assert_matches;
    use chrono::{NaiveTime, Timelike};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2024-01-01 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn policy(
        doctor_id: Option<Uuid>,
        day_of_week: i32,
        start: NaiveTime,
        end: NaiveTime,
        slot_minutes: i32,
    ) -> WorkingHoursPolicy {
        WorkingHoursPolicy {
            id: Uuid::new_v4(),
            organisation_id: Uuid::nil(),
            doctor_id,
            day_of_week,
            start_time: start,
            end_time: end,
            slot_duration_minutes: slot_minutes,
            breaks: vec![],
        }
    }

    fn starts(slots: &[AvailabilitySlot]) -> Vec<(u32, u32)> {
        slots.iter().map(|s| (s.start.hour(), s.start.minute())).collect()
    }

    #[test]
    fn morning_block_in_half_hour_slots() {
        let doctor = Uuid::new_v4();
        let schedule = WeeklySchedule::resolve(doctor, vec![
            policy(Some(doctor), 1, t(9, 0), t(12, 0), 30),
        ]).unwrap();

        let slots = TimeGridBuilder::new().build(
            doctor, &schedule, monday(), monday().succ_opt().unwrap(), &HashSet::new(),
        );

        assert_eq!(starts(&slots), vec![(9, 0), (9, 30), (10, 0), (10, 30), (11, 0), (11, 30)]);
        assert!(slots.iter().all(|s| s.duration_minutes() == 30 && s.doctor_id == doctor));
    }

    #[test]
    fn breaks_split_the_grid_and_remainders_are_dropped() {
        let doctor = Uuid::new_v4();
        let mut p = policy(None, 1, t(9, 0), t(12, 0), 45);
        p.breaks = vec![BreakInterval { start_time: t(10, 0), end_time: t(10, 20) }];
        let schedule = WeeklySchedule::resolve(doctor, vec![p]).unwrap();

        let slots = TimeGridBuilder::new().build(
            doctor, &schedule, monday(), monday().succ_opt().unwrap(), &HashSet::new(),
        );

        // 09:00-10:00 holds one 45 min slot; 10:20-12:00 holds two.
        assert_eq!(starts(&slots), vec![(9, 0), (10, 20), (11, 5)]);
        let break_start = monday().and_time(t(10, 0)).and_utc();
        let break_end = monday().and_time(t(10, 20)).and_utc();
        assert!(slots.iter().all(|s| !(s.start < break_end && break_start < s.end)));
    }

    #[test]
    fn slots_cover_hours_minus_breaks_without_overlap() {
        let doctor = Uuid::new_v4();
        for minutes in [10, 15, 20, 30, 60] {
            let mut p = policy(Some(doctor), 1, t(8, 0), t(13, 0), minutes);
            p.breaks = vec![BreakInterval { start_time: t(10, 0), end_time: t(11, 0) }];
            let schedule = WeeklySchedule::resolve(doctor, vec![p]).unwrap();

            let slots = TimeGridBuilder::new().build(
                doctor, &schedule, monday(), monday().succ_opt().unwrap(), &HashSet::new(),
            );

            let covered: i64 = slots.iter().map(AvailabilitySlot::duration_minutes).sum();
            assert_eq!(covered, 4 * 60, "slot length {}", minutes);
            for pair in slots.windows(2) {
                assert!(pair[0].end <= pair[1].start);
            }
        }
    }

    #[test]
    fn doctor_entries_override_organisation_defaults_per_weekday() {
        let doctor = Uuid::new_v4();
        let other_doctor = Uuid::new_v4();
        let schedule = WeeklySchedule::resolve(doctor, vec![
            policy(None, 1, t(8, 0), t(9, 0), 30),
            policy(None, 2, t(8, 0), t(9, 0), 30),
            policy(Some(doctor), 1, t(14, 0), t(15, 0), 30),
            policy(Some(other_doctor), 2, t(18, 0), t(19, 0), 30),
        ]).unwrap();

        let tuesday = monday().succ_opt().unwrap();
        let slots = TimeGridBuilder::new().build(
            doctor, &schedule, monday(), tuesday.succ_opt().unwrap(), &HashSet::new(),
        );

        // Monday from the doctor's own hours, Tuesday from the organisation default.
        assert_eq!(starts(&slots), vec![(14, 0), (14, 30), (8, 0), (8, 30)]);
        assert_eq!(slots[2].start.date_naive(), tuesday);
    }

    #[test]
    fn days_without_policy_or_closed_contribute_nothing() {
        let doctor = Uuid::new_v4();
        let schedule = WeeklySchedule::resolve(doctor, vec![
            policy(None, 1, t(9, 0), t(10, 0), 30),
        ]).unwrap();

        let next_monday = monday() + Duration::days(7);
        let closed: HashSet<NaiveDate> = [monday()].into_iter().collect();
        let slots = TimeGridBuilder::new().build(
            doctor, &schedule, monday(), next_monday + Duration::days(1), &closed,
        );

        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| s.start.date_naive() == next_monday));
    }

    #[test]
    fn multiple_blocks_per_day_stay_chronological() {
        let doctor = Uuid::new_v4();
        let schedule = WeeklySchedule::resolve(doctor, vec![
            policy(Some(doctor), 1, t(14, 0), t(15, 0), 60),
            policy(Some(doctor), 1, t(9, 0), t(10, 0), 60),
        ]).unwrap();

        let slots = TimeGridBuilder::new().build(
            doctor, &schedule, monday(), monday().succ_opt().unwrap(), &HashSet::new(),
        );
        assert_eq!(starts(&slots), vec![(9, 0), (14, 0)]);
    }

    #[test]
    fn overlapping_entries_for_the_same_day_are_rejected() {
        let doctor = Uuid::new_v4();
        let result = WeeklySchedule::resolve(doctor, vec![
            policy(Some(doctor), 1, t(9, 0), t(12, 0), 30),
            policy(Some(doctor), 1, t(11, 0), t(13, 0), 30),
        ]);
        assert_matches!(result, Err(PolicyError::OverlappingPolicies { day_of_week: 1, .. }));
    }

    #[test]
    fn empty_range_yields_no_slots() {
        let doctor = Uuid::new_v4();
        let schedule = WeeklySchedule::resolve(doctor, vec![
            policy(None, 1, t(9, 0), t(12, 0), 30),
        ]).unwrap();
        let slots = TimeGridBuilder::new().build(doctor, &schedule, monday(), monday(), &HashSet::new());
        assert!(slots.is_empty());
    }
}
