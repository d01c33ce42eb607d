//! Alert lifecycle state machine.
//!
//! Alerts start `active` and only move forward: `active -> acknowledged`,
//! `active -> resolved`, `acknowledged -> resolved`. `resolved` is terminal
//! for status changes and the sole state in which deletion is permitted.

use crate::error::AlertError;
use crate::models::AlertStatus;

/// Check whether `current -> requested` is a legal transition.
///
/// Same-state requests are rejected along with every other pair outside
/// the three forward paths.
pub fn check_transition(current: AlertStatus, requested: AlertStatus) -> Result<(), AlertError> {
    use AlertStatus::*;

    match (current, requested) {
        (Active, Acknowledged) | (Active, Resolved) | (Acknowledged, Resolved) => Ok(()),
        (from, to) => Err(AlertError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Deletion is a distinct action, not a transition: permitted only once
/// the alert has been resolved.
pub fn can_delete(status: AlertStatus) -> bool {
    status == AlertStatus::Resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use AlertStatus::*;

    #[test]
    fn test_legal_transitions() {
        assert!(check_transition(Active, Acknowledged).is_ok());
        assert!(check_transition(Active, Resolved).is_ok());
        assert!(check_transition(Acknowledged, Resolved).is_ok());
    }

    #[test]
    fn test_full_transition_matrix() {
        let all = [Active, Acknowledged, Resolved];
        let legal = [
            (Active, Acknowledged),
            (Active, Resolved),
            (Acknowledged, Resolved),
        ];

        for from in all {
            for to in all {
                let result = check_transition(from, to);
                if legal.contains(&(from, to)) {
                    assert!(result.is_ok(), "{from} -> {to} should be legal");
                } else {
                    assert!(
                        matches!(result, Err(AlertError::InvalidTransition { .. })),
                        "{from} -> {to} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn test_identity_transitions_rejected() {
        for status in [Active, Acknowledged, Resolved] {
            assert!(check_transition(status, status).is_err());
        }
    }

    #[test]
    fn test_resolved_is_terminal() {
        assert!(check_transition(Resolved, Active).is_err());
        assert!(check_transition(Resolved, Acknowledged).is_err());
    }

    #[test]
    fn test_can_delete_only_resolved() {
        assert!(!can_delete(Active));
        assert!(!can_delete(Acknowledged));
        assert!(can_delete(Resolved));
    }
}
