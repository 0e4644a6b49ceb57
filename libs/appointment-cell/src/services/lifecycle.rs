// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Outcome of checking a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Already in the requested status; nothing to write.
    NoOp,
    Apply {
        /// The change is only legal while the appointment has no visit.
        requires_no_visit: bool,
    },
}

/// Status state machine: `Scheduled` is initial, `Completed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<TransitionDecision, AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if current_status == new_status {
            return Ok(TransitionDecision::NoOp);
        }

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(TransitionDecision::Apply {
            requires_no_visit: new_status == AppointmentStatus::Cancelled,
        })
    }

    /// All valid next statuses, excluding staying put.
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        if current_status.is_terminal() {
            return vec![];
        }
        vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled]
    }

    pub fn ensure_cancellable(&self, visit_count: i64) -> Result<(), AppointmentError> {
        if visit_count > 0 {
            return Err(AppointmentError::InvariantViolation(
                "cannot cancel an appointment with an associated visit".to_string(),
            ));
        }
        Ok(())
    }
}
