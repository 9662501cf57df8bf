//! Session status state machine
//!
//! Implements the status graph for a one-to-one call. Transitions are
//! monotonic: a session walks forward through the negotiation states and can
//! only regress to `Inactive` on a failed initiate, or fall into the
//! absorbing `Terminated` state.

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Initial state, nothing negotiated yet
    Inactive,
    /// session-initiate being prepared/sent
    Initiating,
    /// session-initiate acknowledged by the peer
    Initiated,
    /// session-accept being prepared/sent
    Accepting,
    /// session-accept acknowledged, call is live
    Accepted,
    /// session-terminate sent/received
    Terminating,
    /// Call ended, object exhausted
    Terminated,
}

impl SessionStatus {
    /// Get status name
    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Inactive => "inactive",
            SessionStatus::Initiating => "initiating",
            SessionStatus::Initiated => "initiated",
            SessionStatus::Accepting => "accepting",
            SessionStatus::Accepted => "accepted",
            SessionStatus::Terminating => "terminating",
            SessionStatus::Terminated => "terminated",
        }
    }

    /// Check if the session has not ended
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionStatus::Terminating | SessionStatus::Terminated)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionStatus::Terminated)
    }

    /// Check if a transition follows the status graph
    pub fn can_transition(&self, to: SessionStatus) -> bool {
        // Terminated is absorbing and reachable from anywhere
        if to == SessionStatus::Terminated {
            return true;
        }
        // Terminating is reachable from any non-terminated state
        if to == SessionStatus::Terminating {
            return *self != SessionStatus::Terminated;
        }

        matches!(
            (self, to),
            (SessionStatus::Inactive, SessionStatus::Initiating)
                | (SessionStatus::Initiating, SessionStatus::Initiated)
                // Failed initiate rolls the slot back
                | (SessionStatus::Initiating, SessionStatus::Inactive)
                | (SessionStatus::Initiated, SessionStatus::Accepting)
                | (SessionStatus::Accepting, SessionStatus::Accepted)
        )
    }

    /// Apply a transition; leaves the status unchanged when the edge is not
    /// in the graph
    pub fn transition(&mut self, to: SessionStatus) -> bool {
        if *self == to {
            return true;
        }
        if self.can_transition(to) {
            *self = to;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_walk() {
        let mut status = SessionStatus::Inactive;
        for next in [
            SessionStatus::Initiating,
            SessionStatus::Initiated,
            SessionStatus::Accepting,
            SessionStatus::Accepted,
            SessionStatus::Terminating,
            SessionStatus::Terminated,
        ] {
            assert!(status.transition(next), "expected edge to {}", next.name());
        }
        assert_eq!(status, SessionStatus::Terminated);
    }

    #[test]
    fn test_no_skipping_forward() {
        let mut status = SessionStatus::Inactive;
        assert!(!status.transition(SessionStatus::Initiated));
        assert!(!status.transition(SessionStatus::Accepting));
        assert!(!status.transition(SessionStatus::Accepted));
        assert_eq!(status, SessionStatus::Inactive);
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let mut status = SessionStatus::Terminated;
        assert!(!status.transition(SessionStatus::Terminating));
        assert!(!status.transition(SessionStatus::Initiating));
        assert!(status.transition(SessionStatus::Terminated));
        assert_eq!(status, SessionStatus::Terminated);
    }

    #[test]
    fn test_failed_initiate_rolls_back() {
        let mut status = SessionStatus::Initiating;
        assert!(status.transition(SessionStatus::Inactive));
        assert_eq!(status, SessionStatus::Inactive);

        // But later states never regress
        let mut status = SessionStatus::Accepted;
        assert!(!status.transition(SessionStatus::Inactive));
    }

    #[test]
    fn test_terminating_from_any_live_state() {
        for state in [
            SessionStatus::Inactive,
            SessionStatus::Initiating,
            SessionStatus::Initiated,
            SessionStatus::Accepting,
            SessionStatus::Accepted,
        ] {
            let mut status = state;
            assert!(status.transition(SessionStatus::Terminating));
        }
    }

    #[test]
    fn test_status_helpers() {
        assert!(SessionStatus::Accepted.is_active());
        assert!(!SessionStatus::Terminating.is_active());
        assert!(!SessionStatus::Terminated.is_active());
        assert!(SessionStatus::Terminated.is_terminated());
    }
}
