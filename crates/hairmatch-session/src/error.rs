use crate::session::{Action, SessionState};
use hairmatch_hw::CaptureError;
use thiserror::Error;

/// An action was attempted from a state it does not leave from.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {action} while {state}")]
pub struct TransitionError {
    pub state: SessionState,
    pub action: Action,
}

/// Outcomes the controller reports to the caller without changing state.
///
/// Failures that move the session into `Error` are not returned here; they
/// are carried by the session itself (see [`crate::session::Failure`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("free trial already used; upgrade to premium to continue")]
    EntitlementDenied,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}
