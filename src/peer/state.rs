//! Connection state machine
//!
//! The negotiation lifecycle as an explicit transition table. The
//! controller owns the single state instance and feeds it inputs one at a
//! time; everything here is pure so the table is testable on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one session's connection.
///
/// `New → HaveLocalOffer | HaveRemoteOffer → Stable → Connected →
/// {Disconnected, Failed, Closed}`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    Stable,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::HaveLocalOffer => "have-local-offer",
            ConnectionState::HaveRemoteOffer => "have-remote-offer",
            ConnectionState::Stable => "stable",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Inputs the transition table understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationInput {
    /// A local offer was created and sent.
    LocalOffer,
    /// A remote offer was accepted (from `New`, or from `HaveLocalOffer`
    /// when this side yields a glare race).
    RemoteOffer,
    /// A remote answer was applied to our outstanding offer.
    RemoteAnswer,
    /// Our answer to a remote offer went out.
    AnswerSent,
    /// Transport reports connectivity established.
    ConnectivityUp,
    /// Transport reports connectivity lost after being established.
    ConnectivityLost,
    /// Transport gave up.
    TransportFailed,
    /// A negotiation step failed or timed out; the attempt is aborted.
    NegotiationFailed,
    /// Local teardown.
    Close,
}

/// The state × input table. `None` means the input is not accepted in that
/// state; the caller decides whether that is a dropped message or a
/// rejected command.
pub fn next_state(state: ConnectionState, input: NegotiationInput) -> Option<ConnectionState> {
    use ConnectionState::*;
    use NegotiationInput::*;

    match (state, input) {
        (Closed, _) => None,
        (_, Close) => Some(Closed),
        (_, TransportFailed) => Some(Failed),

        (New, LocalOffer) => Some(HaveLocalOffer),
        (New, RemoteOffer) => Some(HaveRemoteOffer),
        // Glare: the yielding side rolls its own offer back and answers.
        (HaveLocalOffer, RemoteOffer) => Some(HaveRemoteOffer),
        (HaveLocalOffer, RemoteAnswer) => Some(Stable),
        (HaveRemoteOffer, AnswerSent) => Some(Stable),

        // An aborted attempt lands back where a fresh start_call works.
        (New | HaveLocalOffer | HaveRemoteOffer, NegotiationFailed) => Some(New),

        (Stable, ConnectivityUp) => Some(Connected),
        (Connected, ConnectivityLost) => Some(Disconnected),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;
    use NegotiationInput::*;

    #[test]
    fn test_caller_path() {
        let mut state = New;
        for (input, expected) in [
            (LocalOffer, HaveLocalOffer),
            (RemoteAnswer, Stable),
            (ConnectivityUp, Connected),
        ] {
            state = next_state(state, input).expect("caller path transition");
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_callee_path() {
        let mut state = New;
        for (input, expected) in [
            (RemoteOffer, HaveRemoteOffer),
            (AnswerSent, Stable),
            (ConnectivityUp, Connected),
        ] {
            state = next_state(state, input).expect("callee path transition");
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_glare_yield_is_accepted_from_have_local_offer() {
        assert_eq!(next_state(HaveLocalOffer, RemoteOffer), Some(HaveRemoteOffer));
    }

    #[test]
    fn test_connectivity_lost_only_after_connected() {
        assert_eq!(next_state(Connected, ConnectivityLost), Some(Disconnected));
        assert_eq!(next_state(Stable, ConnectivityLost), None);
        assert_eq!(next_state(New, ConnectivityLost), None);
    }

    #[test]
    fn test_close_accepted_from_every_live_state() {
        for state in [
            New,
            HaveLocalOffer,
            HaveRemoteOffer,
            Stable,
            Connected,
            Disconnected,
            Failed,
        ] {
            assert_eq!(next_state(state, Close), Some(Closed), "close from {}", state);
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(Closed.is_terminal());
        for input in [
            LocalOffer,
            RemoteOffer,
            RemoteAnswer,
            AnswerSent,
            ConnectivityUp,
            ConnectivityLost,
            TransportFailed,
            NegotiationFailed,
            Close,
        ] {
            assert_eq!(next_state(Closed, input), None, "closed must ignore {:?}", input);
        }
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        // A second local offer, an answer out of nowhere, a stray answer on
        // the answering side.
        assert_eq!(next_state(HaveLocalOffer, LocalOffer), None);
        assert_eq!(next_state(New, RemoteAnswer), None);
        assert_eq!(next_state(HaveRemoteOffer, RemoteAnswer), None);
        assert_eq!(next_state(Stable, RemoteOffer), None);
        assert_eq!(next_state(Connected, LocalOffer), None);
    }

    #[test]
    fn test_failure_reachable_from_active_states() {
        for state in [New, HaveLocalOffer, HaveRemoteOffer, Stable, Connected] {
            assert_eq!(next_state(state, TransportFailed), Some(Failed));
        }
    }

    #[test]
    fn test_negotiation_failure_returns_to_new() {
        for state in [New, HaveLocalOffer, HaveRemoteOffer] {
            assert_eq!(next_state(state, NegotiationFailed), Some(New));
        }
        // Once stable or connected there is no in-flight attempt to abort.
        assert_eq!(next_state(Stable, NegotiationFailed), None);
        assert_eq!(next_state(Connected, NegotiationFailed), None);
    }

    #[test]
    fn test_state_display_names() {
        assert_eq!(HaveLocalOffer.to_string(), "have-local-offer");
        assert_eq!(Connected.to_string(), "connected");
    }
}
