//! Upgrade attempt identity and lifecycle.
//!
//! [`AttemptId`] is a newtype wrapper around [`uuid::Uuid`] (v4). One is
//! minted per raw upgrade request; it ties the capability, the sentinel
//! response and the logging of that request together.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of one upgrade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(uuid::Uuid);

impl AttemptId {
    /// Creates a new random `AttemptId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an upgrade attempt is in its lifecycle.
///
/// ```text
/// Pending ──► Accepted ──► Attached
///    │
///    └──────► Rejected ──► Discarded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// The request is being rendered.
    Pending,
    /// Rendering returned this attempt's sentinel.
    Accepted,
    /// The handshake completed and the logical socket is attached.
    Attached,
    /// Rendering returned anything else.
    Rejected,
    /// The physical connection was torn down.
    Discarded,
}

impl AttemptState {
    /// Returns `true` if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Rejected)
                | (Self::Accepted, Self::Attached)
                | (Self::Rejected, Self::Discarded)
        )
    }

    /// Returns `true` for `Attached` and `Discarded`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Attached | Self::Discarded)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Attached => "attached",
            Self::Rejected => "rejected",
            Self::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(AttemptId::new(), AttemptId::new());
    }

    #[test]
    fn display_is_uuid_format() {
        let id = AttemptId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn accepted_path_is_legal() {
        assert!(AttemptState::Pending.can_advance_to(AttemptState::Accepted));
        assert!(AttemptState::Accepted.can_advance_to(AttemptState::Attached));
        assert!(AttemptState::Attached.is_terminal());
    }

    #[test]
    fn rejected_path_is_legal() {
        assert!(AttemptState::Pending.can_advance_to(AttemptState::Rejected));
        assert!(AttemptState::Rejected.can_advance_to(AttemptState::Discarded));
        assert!(AttemptState::Discarded.is_terminal());
    }

    #[test]
    fn illegal_transitions_are_refused() {
        assert!(!AttemptState::Pending.can_advance_to(AttemptState::Attached));
        assert!(!AttemptState::Rejected.can_advance_to(AttemptState::Attached));
        assert!(!AttemptState::Accepted.can_advance_to(AttemptState::Discarded));
        assert!(!AttemptState::Attached.can_advance_to(AttemptState::Pending));
        assert!(!AttemptState::Pending.is_terminal());
    }

    #[test]
    fn state_serializes_snake_case() {
        let Ok(json) = serde_json::to_string(&AttemptState::Discarded) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"discarded\"");
    }
}
