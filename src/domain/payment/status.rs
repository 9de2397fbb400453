//! Transaction status state machine.
//!
//! The ledger only ever moves forward:
//!
//! ```text
//! pending ──► completed ──► refunded
//!    │
//!    └──────► failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Ledger status of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Order created at the provider, awaiting payment confirmation.
    Pending,

    /// Provider confirmed the capture. Grants the product.
    Completed,

    /// Denied by the provider or expired by the sweeper.
    Failed,

    /// Money returned to the buyer after completion.
    Refunded,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown transaction status '{}'", other),
            )),
        }
    }
}

impl StateMachine for TransactionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, target),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TransactionStatus::*;
        match self {
            Pending => vec![Completed, Failed],
            Completed => vec![Refunded],
            Failed => vec![],
            Refunded => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pending_can_complete_or_fail() {
        assert_eq!(
            TransactionStatus::Pending.transition_to(TransactionStatus::Completed),
            Ok(TransactionStatus::Completed)
        );
        assert_eq!(
            TransactionStatus::Pending.transition_to(TransactionStatus::Failed),
            Ok(TransactionStatus::Failed)
        );
    }

    #[test]
    fn completed_can_only_be_refunded() {
        assert_eq!(
            TransactionStatus::Completed.valid_transitions(),
            vec![TransactionStatus::Refunded]
        );
    }

    #[test]
    fn failed_cannot_be_completed() {
        assert!(TransactionStatus::Failed
            .transition_to(TransactionStatus::Completed)
            .is_err());
    }

    #[test]
    fn pending_cannot_be_refunded() {
        assert!(!TransactionStatus::Pending.can_transition_to(&TransactionStatus::Refunded));
    }

    #[test]
    fn failed_and_refunded_are_terminal() {
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Refunded.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Completed.is_terminal());
    }

    #[test]
    fn no_state_transitions_to_itself() {
        for status in TransactionStatus::ALL {
            assert!(!status.can_transition_to(&status), "{:?}", status);
        }
    }

    #[test]
    fn string_form_roundtrips() {
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<TransactionStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = TransactionStatus> {
        prop::sample::select(TransactionStatus::ALL.to_vec())
    }

    proptest! {
        /// Whatever sequence of targets is attempted, the accepted path is a
        /// prefix of pending -> {completed|failed} -> refunded.
        #[test]
        fn accepted_paths_are_monotonic(targets in prop::collection::vec(any_status(), 0..20)) {
            let mut current = TransactionStatus::Pending;
            let mut path = vec![current];
            for target in targets {
                if let Ok(next) = current.transition_to(target) {
                    current = next;
                    path.push(current);
                }
            }

            let allowed: [&[TransactionStatus]; 4] = [
                &[TransactionStatus::Pending],
                &[TransactionStatus::Pending, TransactionStatus::Completed],
                &[TransactionStatus::Pending, TransactionStatus::Failed],
                &[TransactionStatus::Pending, TransactionStatus::Completed, TransactionStatus::Refunded],
            ];
            prop_assert!(allowed.iter().any(|p| *p == path.as_slice()), "path {:?}", path);
        }
    }
}
