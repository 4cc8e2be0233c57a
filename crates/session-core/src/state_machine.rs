//! The session lifecycle state machine.
//!
//! All status changes funnel through [`transition`], a pure function over
//! (current status, lifecycle event). Callers serialize its application;
//! the function itself holds no state. Terminal states absorb every
//! event, which is what makes teardown and late notifications idempotent.

use televisit_signaling_core::LinkState;

use crate::types::{EndReason, SessionStatus};

/// Everything that can move a session between lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The peer transport link changed state
    Link(LinkState),
    /// No answer arrived within the negotiation window
    NegotiationTimedOut,
    /// The signaling bus rejected a delivery
    SignalingFailed,
    /// The local side requested the session end
    HangUp,
}

/// A state change produced by [`transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionStatus,
    pub reason: Option<EndReason>,
}

impl Transition {
    fn to(next: SessionStatus) -> Self {
        Self { next, reason: None }
    }

    fn terminal(next: SessionStatus, reason: EndReason) -> Self {
        Self {
            next,
            reason: Some(reason),
        }
    }
}

/// Compute the state change for an event, or `None` when the event does
/// not move the session.
///
/// Legal histories are a prefix of: `waiting`, then one of
/// `active`/`failed`, then one of `ended`/`failed`. `ended` is only
/// reachable from `active`; a session torn down before it ever became
/// active fails instead.
pub fn transition(current: SessionStatus, event: &LifecycleEvent) -> Option<Transition> {
    if current.is_terminal() {
        return None;
    }
    match (current, event) {
        // Connecting is not a state change in either phase
        (_, LifecycleEvent::Link(LinkState::Connecting)) => None,

        (SessionStatus::Waiting, LifecycleEvent::Link(LinkState::Connected)) => {
            Some(Transition::to(SessionStatus::Active))
        }
        (SessionStatus::Waiting, LifecycleEvent::Link(LinkState::Disconnected))
        | (SessionStatus::Waiting, LifecycleEvent::Link(LinkState::Failed)) => Some(
            Transition::terminal(SessionStatus::Failed, EndReason::TransportFailure),
        ),
        (SessionStatus::Waiting, LifecycleEvent::NegotiationTimedOut) => Some(
            Transition::terminal(SessionStatus::Failed, EndReason::NegotiationTimeout),
        ),
        (SessionStatus::Waiting, LifecycleEvent::SignalingFailed) => Some(Transition::terminal(
            SessionStatus::Failed,
            EndReason::SignalingFailure,
        )),
        (SessionStatus::Waiting, LifecycleEvent::HangUp) => Some(Transition::terminal(
            SessionStatus::Failed,
            EndReason::Cancelled,
        )),

        (SessionStatus::Active, LifecycleEvent::Link(LinkState::Connected)) => None,
        (SessionStatus::Active, LifecycleEvent::Link(LinkState::Disconnected)) => Some(
            Transition::terminal(SessionStatus::Ended, EndReason::RemoteDisconnect),
        ),
        (SessionStatus::Active, LifecycleEvent::Link(LinkState::Failed)) => Some(
            Transition::terminal(SessionStatus::Failed, EndReason::TransportFailure),
        ),
        // The answer already arrived; a late timer is stale
        (SessionStatus::Active, LifecycleEvent::NegotiationTimedOut) => None,
        (SessionStatus::Active, LifecycleEvent::SignalingFailed) => Some(Transition::terminal(
            SessionStatus::Failed,
            EndReason::SignalingFailure,
        )),
        (SessionStatus::Active, LifecycleEvent::HangUp) => Some(Transition::terminal(
            SessionStatus::Ended,
            EndReason::LocalHangup,
        )),

        (SessionStatus::Ended | SessionStatus::Failed, _) => None,
    }
}
