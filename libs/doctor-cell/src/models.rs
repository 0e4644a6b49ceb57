use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A pause inside a working-hours block, e.g. lunch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakInterval {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Recurring working hours for one weekday.
///
/// `doctor_id == None` marks the organisation-wide default. Times are
/// wall-clock UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingHoursPolicy {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    #[serde(default)]
    pub breaks: Vec<BreakInterval>,
}

impl WorkingHoursPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !(0..=6).contains(&self.day_of_week) {
            return Err(PolicyError::InvalidWeekday(self.day_of_week));
        }

        if self.start_time >= self.end_time {
            return Err(PolicyError::EmptyWorkingHours {
                policy_id: self.id,
                start: self.start_time,
                end: self.end_time,
            });
        }

        if self.slot_duration_minutes <= 0 {
            return Err(PolicyError::InvalidSlotDuration {
                policy_id: self.id,
                minutes: self.slot_duration_minutes,
            });
        }

        for interval in &self.breaks {
            if interval.start_time >= interval.end_time
                || interval.start_time < self.start_time
                || interval.end_time > self.end_time
            {
                return Err(PolicyError::BreakOutsideHours {
                    policy_id: self.id,
                    start: interval.start_time,
                    end: interval.end_time,
                });
            }
        }

        Ok(())
    }

    /// `[start, end)` minus the breaks, in chronological order.
    pub fn free_segments(&self) -> Vec<(NaiveTime, NaiveTime)> {
        let mut breaks = self.breaks.clone();
        breaks.sort_by_key(|b| b.start_time);

        let mut segments = Vec::with_capacity(breaks.len() + 1);
        let mut cursor = self.start_time;

        for interval in breaks {
            if interval.start_time > cursor {
                segments.push((cursor, interval.start_time));
            }
            cursor = cursor.max(interval.end_time);
        }

        if cursor < self.end_time {
            segments.push((cursor, self.end_time));
        }

        segments
    }
}

/// A day on which the whole organisation is closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlackoutDate {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub blackout_date: NaiveDate,
    pub reason: Option<String>,
}

/// A bookable interval, derived per query and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilitySlot {
    pub doctor_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Index used by `WorkingHoursPolicy::day_of_week`.
pub fn day_of_week_index(weekday: Weekday) -> i32 {
    weekday.num_days_from_sunday() as i32
}

pub fn day_of_week_for(date: NaiveDate) -> i32 {
    day_of_week_index(date.weekday())
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Day of week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidWeekday(i32),

    #[error("Policy {policy_id}: start time {start} must be before end time {end}")]
    EmptyWorkingHours { policy_id: Uuid, start: NaiveTime, end: NaiveTime },

    #[error("Policy {policy_id}: slot duration must be positive, got {minutes}")]
    InvalidSlotDuration { policy_id: Uuid, minutes: i32 },

    #[error("Policy {policy_id}: break {start}-{end} is not inside working hours")]
    BreakOutsideHours { policy_id: Uuid, start: NaiveTime, end: NaiveTime },

    #[error("Policies {first} and {second} overlap on day {day_of_week}")]
    OverlappingPolicies { first: Uuid, second: Uuid, day_of_week: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn policy(start: NaiveTime, end: NaiveTime, breaks: Vec<BreakInterval>) -> WorkingHoursPolicy {
        WorkingHoursPolicy {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            doctor_id: None,
            day_of_week: 1,
            start_time: start,
            end_time: end,
            slot_duration_minutes: 30,
            breaks,
        }
    }

    #[test]
    fn free_segments_subtract_breaks() {
        let p = policy(t(9, 0), t(17, 0), vec![
            BreakInterval { start_time: t(15, 0), end_time: t(15, 15) },
            BreakInterval { start_time: t(12, 0), end_time: t(13, 0) },
        ]);

        assert_eq!(p.free_segments(), vec![
            (t(9, 0), t(12, 0)),
            (t(13, 0), t(15, 0)),
            (t(15, 15), t(17, 0)),
        ]);
    }

    #[test]
    fn break_touching_the_edges_leaves_no_empty_segment() {
        let p = policy(t(9, 0), t(12, 0), vec![
            BreakInterval { start_time: t(9, 0), end_time: t(9, 30) },
            BreakInterval { start_time: t(11, 30), end_time: t(12, 0) },
        ]);

        assert_eq!(p.free_segments(), vec![(t(9, 30), t(11, 30))]);
    }

    #[test]
    fn validate_rejects_inverted_hours_and_stray_breaks() {
        assert_matches!(
            policy(t(12, 0), t(9, 0), vec![]).validate(),
            Err(PolicyError::EmptyWorkingHours { .. })
        );

        let stray = policy(t(9, 0), t(12, 0), vec![
            BreakInterval { start_time: t(11, 0), end_time: t(12, 30) },
        ]);
        assert_matches!(stray.validate(), Err(PolicyError::BreakOutsideHours { .. }));

        let mut zero = policy(t(9, 0), t(12, 0), vec![]);
        zero.slot_duration_minutes = 0;
        assert_matches!(zero.validate(), Err(PolicyError::InvalidSlotDuration { minutes: 0, .. }));
    }

    #[test]
    fn weekday_index_starts_on_sunday() {
        assert_eq!(day_of_week_index(Weekday::Sun), 0);
        assert_eq!(day_of_week_index(Weekday::Mon), 1);
        assert_eq!(day_of_week_index(Weekday::Sat), 6);
    }

    #[test]
    fn policy_deserializes_from_postgrest_row() {
        let row = serde_json::json!({
            "id": Uuid::new_v4(),
            "organisation_id": Uuid::new_v4(),
            "doctor_id": null,
            "day_of_week": 1,
            "start_time": "09:00:00",
            "end_time": "12:00:00",
            "slot_duration_minutes": 30
        });

        let parsed: WorkingHoursPolicy = serde_json::from_value(row).unwrap();
        assert_eq!(parsed.start_time, t(9, 0));
        assert!(parsed.breaks.is_empty());
        assert_eq!(parsed.doctor_id, None);
    }
}
