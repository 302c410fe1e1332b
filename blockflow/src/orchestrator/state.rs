//! Per-block execution states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a block got to during a run.
///
/// ```text
/// Pending -> Loaded -> Executed
/// Pending -> LoadFailed
/// Loaded  -> ExecFailed
/// Pending -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    /// Not started.
    #[default]
    Pending,
    /// Function loaded, not yet finished.
    Loaded,
    /// Function returned a new context.
    Executed,
    /// No function could be loaded.
    LoadFailed,
    /// The function failed.
    ExecFailed,
    /// Never started because the run was cancelled.
    Cancelled,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Loaded => write!(f, "loaded"),
            Self::Executed => write!(f, "executed"),
            Self::LoadFailed => write!(f, "load_failed"),
            Self::ExecFailed => write!(f, "exec_failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl BlockState {
    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Executed | Self::LoadFailed | Self::ExecFailed | Self::Cancelled
        )
    }

    /// Returns true if the state indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::LoadFailed | Self::ExecFailed)
    }

    /// Returns true if moving to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Loaded | Self::LoadFailed | Self::Cancelled)
                | (Self::Loaded, Self::Executed | Self::ExecFailed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_state_display() {
        assert_eq!(BlockState::Pending.to_string(), "pending");
        assert_eq!(BlockState::ExecFailed.to_string(), "exec_failed");
        assert_eq!(BlockState::LoadFailed.to_string(), "load_failed");
    }

    #[test]
    fn test_block_state_is_terminal() {
        assert!(BlockState::Executed.is_terminal());
        assert!(BlockState::Cancelled.is_terminal());
        assert!(!BlockState::Pending.is_terminal());
        assert!(!BlockState::Loaded.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(BlockState::Pending.can_transition_to(BlockState::Loaded));
        assert!(BlockState::Loaded.can_transition_to(BlockState::ExecFailed));
        assert!(!BlockState::Pending.can_transition_to(BlockState::Executed));
        assert!(!BlockState::Executed.can_transition_to(BlockState::Loaded));
    }

    #[test]
    fn test_block_state_serialize() {
        let json = serde_json::to_string(&BlockState::LoadFailed).unwrap();
        assert_eq!(json, r#""load_failed""#);

        let back: BlockState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BlockState::LoadFailed);
    }
}
