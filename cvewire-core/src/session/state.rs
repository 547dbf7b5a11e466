/// Lifecycle of a client session.
///
/// ```text
/// Connecting ──► Registered ──► Closing ──► Closed
///      │                           ▲          ▲
///      └───────────────────────────┴──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registered,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Registered)
                | (Connecting, Closing)
                | (Connecting, Closed)
                | (Registered, Closing)
                | (Closing, Closed)
        )
    }

    pub fn transition(self, next: SessionState) -> Result<SessionState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SessionState::Connecting
            .transition(SessionState::Registered)
            .and_then(|s| s.transition(SessionState::Closing))
            .and_then(|s| s.transition(SessionState::Closed))
            .unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_rejected_registration_skips_registered() {
        assert!(SessionState::Connecting.can_transition_to(SessionState::Closed));
    }

    #[test]
    fn test_illegal_transitions() {
        use SessionState::*;
        for (from, to) in [
            (Closed, Connecting),
            (Closed, Registered),
            (Closing, Registered),
            (Registered, Connecting),
            (Registered, Closed),
            (Registered, Registered),
        ] {
            assert_eq!(
                from.transition(to),
                Err(InvalidTransition { from, to }),
                "{from:?} -> {to:?}"
            );
        }
    }
}
