use chrono::{DateTime, Utc};
use tracing::debug;

use doctor_cell::AvailabilitySlot;

use crate::models::Appointment;

/// Half-open interval overlap checks between slots and booked appointments.
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    /// `[start1, end1)` and `[start2, end2)` share at least one instant.
    /// Touching intervals do not overlap.
    pub fn intervals_overlap(
        start1: DateTime<Utc>,
        end1: DateTime<Utc>,
        start2: DateTime<Utc>,
        end2: DateTime<Utc>,
    ) -> bool {
        start1 < end2 && start2 < end1
    }

    /// Appointments that block `[start, end)`. Cancelled ones never do.
    pub fn find_conflicts<'a>(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        appointments: &'a [Appointment],
    ) -> Vec<&'a Appointment> {
        appointments
            .iter()
            .filter(|apt| apt.status.occupies_slot())
            .filter(|apt| Self::intervals_overlap(start, end, apt.scheduled_start, apt.scheduled_end))
            .collect()
    }

    /// Drops every candidate slot overlapping a non-cancelled appointment,
    /// keeping the input order.
    pub fn filter_available(
        mut slots: Vec<AvailabilitySlot>,
        appointments: &[Appointment],
    ) -> Vec<AvailabilitySlot> {
        let before = slots.len();
        slots.retain(|slot| Self::find_conflicts(slot.start, slot.end, appointments).is_empty());

        debug!("Conflict filter removed {} of {} candidate slots", before - slots.len(), before);
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn appointment(doctor_id: Uuid, start: DateTime<Utc>, minutes: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            scheduled_start: start,
            scheduled_end: start + Duration::minutes(minutes),
            status,
            created_at: start,
            updated_at: start,
        }
    }

    fn half_hour_slots(doctor_id: Uuid, from: DateTime<Utc>, count: i64) -> Vec<AvailabilitySlot> {
        (0..count)
            .map(|i| AvailabilitySlot {
                doctor_id,
                start: from + Duration::minutes(30 * i),
                end: from + Duration::minutes(30 * (i + 1)),
            })
            .collect()
    }

    #[test]
    fn adjacency_is_not_a_conflict() {
        assert!(!ConflictDetectionService::intervals_overlap(at(9, 0), at(10, 0), at(10, 0), at(10, 30)));
        assert!(!ConflictDetectionService::intervals_overlap(at(10, 30), at(11, 0), at(10, 0), at(10, 30)));
        assert!(ConflictDetectionService::intervals_overlap(at(9, 0), at(10, 1), at(10, 0), at(10, 30)));
        assert!(ConflictDetectionService::intervals_overlap(at(10, 10), at(10, 20), at(10, 0), at(10, 30)));
    }

    #[test]
    fn removes_only_the_booked_slot() {
        let doctor = Uuid::new_v4();
        let slots = half_hour_slots(doctor, at(9, 0), 6);
        let booked = vec![appointment(doctor, at(10, 0), 30, AppointmentStatus::Scheduled)];

        let free = ConflictDetectionService::filter_available(slots, &booked);
        let starts: Vec<_> = free.iter().map(|s| s.start).collect();

        assert_eq!(starts, vec![at(9, 0), at(9, 30), at(10, 30), at(11, 0), at(11, 30)]);
    }

    #[test]
    fn misaligned_booking_removes_every_touched_slot() {
        let doctor = Uuid::new_v4();
        let slots = half_hour_slots(doctor, at(9, 0), 6);
        let booked = vec![appointment(doctor, at(9, 45), 60, AppointmentStatus::Completed)];

        let free = ConflictDetectionService::filter_available(slots.clone(), &booked);

        assert_eq!(free.len(), 3);
        for slot in &free {
            assert!(slots.contains(slot));
            assert!(booked.iter().all(|apt| !apt.overlaps(slot.start, slot.end)));
        }
    }

    #[test]
    fn cancelled_appointments_are_ignored() {
        let doctor = Uuid::new_v4();
        let slots = half_hour_slots(doctor, at(9, 0), 2);
        let cancelled = vec![appointment(doctor, at(9, 0), 60, AppointmentStatus::Cancelled)];

        assert_eq!(ConflictDetectionService::filter_available(slots.clone(), &cancelled), slots);
        assert!(ConflictDetectionService::find_conflicts(at(9, 0), at(10, 0), &cancelled).is_empty());
    }
}
