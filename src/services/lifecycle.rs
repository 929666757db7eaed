//! Scan lifecycle state machine.
//!
//! `pending -> running -> {completed, failed}`, with `pending -> failed`
//! allowed when a scan cannot start. Completed and failed are terminal.

use crate::errors::AppError;
use crate::models::scan::ScanStatus;

/// Check whether a status transition is valid per the state machine graph.
pub fn is_valid_transition(from: ScanStatus, to: ScanStatus) -> bool {
    matches!(
        (from, to),
        (ScanStatus::Pending, ScanStatus::Running)
            | (ScanStatus::Pending, ScanStatus::Failed)
            | (ScanStatus::Running, ScanStatus::Completed)
            | (ScanStatus::Running, ScanStatus::Failed)
    )
}

/// Validate a transition, returning `InvalidTransition` on any illegal edge.
pub fn validate_transition(id: i64, from: ScanStatus, to: ScanStatus) -> Result<(), AppError> {
    if from.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "Scan {id} is already {from} and cannot move to {to}"
        )));
    }

    if !is_valid_transition(from, to) {
        return Err(AppError::InvalidTransition(format!(
            "Scan {id} cannot transition from {from} to {to}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ScanStatus; 4] = [
        ScanStatus::Pending,
        ScanStatus::Running,
        ScanStatus::Completed,
        ScanStatus::Failed,
    ];

    #[test]
    fn pending_to_running() {
        assert!(is_valid_transition(ScanStatus::Pending, ScanStatus::Running));
    }

    #[test]
    fn pending_to_failed() {
        assert!(is_valid_transition(ScanStatus::Pending, ScanStatus::Failed));
    }

    #[test]
    fn running_to_completed() {
        assert!(is_valid_transition(ScanStatus::Running, ScanStatus::Completed));
    }

    #[test]
    fn running_to_failed() {
        assert!(is_valid_transition(ScanStatus::Running, ScanStatus::Failed));
    }

    #[test]
    fn cannot_skip_running() {
        assert!(!is_valid_transition(ScanStatus::Pending, ScanStatus::Completed));
    }

    #[test]
    fn cannot_go_back_to_pending() {
        assert!(!is_valid_transition(ScanStatus::Running, ScanStatus::Pending));
    }

    #[test]
    fn self_transitions_rejected() {
        for status in ALL {
            assert!(!is_valid_transition(status, status), "{status} -> {status}");
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [ScanStatus::Completed, ScanStatus::Failed] {
            for to in ALL {
                assert!(!is_valid_transition(from, to));
                let err = validate_transition(1, from, to).unwrap_err();
                assert!(err.is_invalid_transition());
            }
        }
    }

    #[test]
    fn validate_transition_message_names_states() {
        let err = validate_transition(9, ScanStatus::Completed, ScanStatus::Running).unwrap_err();
        assert!(err.to_string().contains("already completed"));
        assert!(err.to_string().contains("Scan 9"));
    }
}
