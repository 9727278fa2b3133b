//! External Transfer Status
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!    ↓           ↓
//!  FAILED  ←─────┘
//! ```
//!
//! Stored as lowercase TEXT. COMPLETED and FAILED are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalTransferStatus {
    /// Intent recorded, external call not started
    Pending,
    /// External call in progress or outcome not yet recorded
    Processing,
    /// Terminal: bank accepted and local debit committed
    Completed,
    /// Terminal: see `error_message`
    Failed,
}

impl ExternalTransferStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExternalTransferStatus::Completed | ExternalTransferStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: ExternalTransferStatus) -> bool {
        use ExternalTransferStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// States from which `self` may be entered. Used for compare-and-set updates.
    pub fn predecessors(&self) -> &'static [ExternalTransferStatus] {
        use ExternalTransferStatus::*;
        match self {
            Pending => &[],
            Processing => &[Pending],
            Completed => &[Processing],
            Failed => &[Pending, Processing],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalTransferStatus::Pending => "pending",
            ExternalTransferStatus::Processing => "processing",
            ExternalTransferStatus::Completed => "completed",
            ExternalTransferStatus::Failed => "failed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(ExternalTransferStatus::Pending),
            "processing" => Some(ExternalTransferStatus::Processing),
            "completed" => Some(ExternalTransferStatus::Completed),
            "failed" => Some(ExternalTransferStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ExternalTransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid external transfer status: {0}")]
pub struct InvalidStatus(pub String);

impl FromStr for ExternalTransferStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

impl TryFrom<String> for ExternalTransferStatus {
    type Error = InvalidStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExternalTransferStatus::*;

    const ALL: [ExternalTransferStatus; 4] = [Pending, Processing, Completed, Failed];

    #[test]
    fn test_terminal_states() {
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        for next in ALL {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        assert!(!Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
    }

    #[test]
    fn test_predecessors_agree_with_transitions() {
        for to in ALL {
            for from in ALL {
                assert_eq!(
                    to.predecessors().contains(&from),
                    from.can_transition_to(to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_parse_names() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<ExternalTransferStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<ExternalTransferStatus>().is_err());
        assert_eq!(Processing.to_string(), "processing");
    }
}
