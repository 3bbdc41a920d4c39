//! Transient per-attempt state: the capture/analysis state machine.
//!
//! [`CaptureSession`] holds no I/O. Every method is one transition edge and
//! rejects calls from states that edge does not leave from, so the
//! controller cannot drive the session into an inconsistent shape.

use crate::error::TransitionError;
use hairmatch_core::{Analysis, Photo};
use hairmatch_hw::CaptureError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound of the analysis progress indicator.
pub const PROGRESS_MAX: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    RequestingPermission,
    PermissionDenied,
    LivePreview,
    Captured,
    Analyzing,
    Results,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::RequestingPermission => "requesting permission",
            SessionState::PermissionDenied => "permission denied",
            SessionState::LivePreview => "live preview",
            SessionState::Captured => "captured",
            SessionState::Analyzing => "analyzing",
            SessionState::Results => "results",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User or device events that drive the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartCamera,
    Upload,
    AccessGranted,
    Capture,
    Cancel,
    BeginAnalysis,
    Progress,
    Complete,
    Fail,
    RetryAnalysis,
    PermissionCheck,
    HoldPreview,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::StartCamera => "start camera",
            Action::Upload => "upload a photo",
            Action::AccessGranted => "attach a stream",
            Action::Capture => "capture",
            Action::Cancel => "cancel",
            Action::BeginAnalysis => "begin analysis",
            Action::Progress => "advance progress",
            Action::Complete => "store a result",
            Action::Fail => "record a failure",
            Action::RetryAnalysis => "retry analysis",
            Action::PermissionCheck => "re-check permission",
            Action::HoldPreview => "hold the preview",
        };
        f.write_str(s)
    }
}

/// Why a session landed in `Error` or `PermissionDenied`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Capture(CaptureError),
    AnalysisFailed(String),
    InvalidPhoto(String),
}

impl Failure {
    /// Text shown to the user, including how to recover.
    pub fn message(&self) -> String {
        match self {
            Failure::Capture(err) => err.remediation().to_string(),
            Failure::AnalysisFailed(reason) => {
                format!("We could not analyze your photo ({reason}). Retry with the same photo or start over.")
            }
            Failure::InvalidPhoto(reason) => {
                format!("The selected file is not a readable image ({reason}). Choose another photo.")
            }
        }
    }

    /// Analysis failures can be retried with the photo already held.
    pub fn is_retryable_analysis(&self) -> bool {
        matches!(self, Failure::AnalysisFailed(_))
    }
}

/// One analysis attempt, from the first user action to result or reset.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    id: Uuid,
    state: SessionState,
    photo: Option<Arc<Photo>>,
    progress: f32,
    result: Option<Analysis>,
    error: Option<Failure>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            photo: None,
            progress: 0.0,
            result: None,
            error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn photo(&self) -> Option<&Arc<Photo>> {
        self.photo.as_ref()
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn result(&self) -> Option<&Analysis> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&Failure> {
        self.error.as_ref()
    }

    /// Fail with [`TransitionError`] unless the session is in one of `from`.
    pub fn ensure(&self, from: &[SessionState], action: Action) -> Result<(), TransitionError> {
        if from.contains(&self.state) {
            Ok(())
        } else {
            Err(TransitionError {
                state: self.state,
                action,
            })
        }
    }

    /// Idle → RequestingPermission.
    pub fn begin_permission_request(&mut self) -> Result<(), TransitionError> {
        self.ensure(&[SessionState::Idle], Action::StartCamera)?;
        self.error = None;
        self.state = SessionState::RequestingPermission;
        Ok(())
    }

    /// RequestingPermission → LivePreview.
    pub fn access_granted(&mut self) -> Result<(), TransitionError> {
        self.ensure(&[SessionState::RequestingPermission], Action::AccessGranted)?;
        self.state = SessionState::LivePreview;
        Ok(())
    }

    /// RequestingPermission | LivePreview → Idle.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.ensure(
            &[SessionState::RequestingPermission, SessionState::LivePreview],
            Action::Cancel,
        )?;
        self.error = None;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// LivePreview → Captured, with a still grabbed from the stream.
    pub fn capture_still(&mut self, photo: Photo) -> Result<(), TransitionError> {
        self.ensure(&[SessionState::LivePreview], Action::Capture)?;
        self.photo = Some(Arc::new(photo));
        self.state = SessionState::Captured;
        Ok(())
    }

    /// Idle → Captured, with an uploaded photo.
    pub fn upload(&mut self, photo: Photo) -> Result<(), TransitionError> {
        self.ensure(&[SessionState::Idle], Action::Upload)?;
        self.error = None;
        self.photo = Some(Arc::new(photo));
        self.state = SessionState::Captured;
        Ok(())
    }

    /// Captured → Analyzing, or Error → Analyzing when retrying a failed
    /// analysis with the photo already held. Progress restarts at zero.
    pub fn begin_analysis(&mut self) -> Result<(), TransitionError> {
        let retrying = self.state == SessionState::Error
            && self.photo.is_some()
            && self.error.as_ref().is_some_and(Failure::is_retryable_analysis);
        if !retrying {
            let action = if self.state == SessionState::Error {
                Action::RetryAnalysis
            } else {
                Action::BeginAnalysis
            };
            self.ensure(&[SessionState::Captured], action)?;
        }
        self.progress = 0.0;
        self.result = None;
        self.error = None;
        self.state = SessionState::Analyzing;
        Ok(())
    }

    /// Add `step` to the progress indicator, clamped to [`PROGRESS_MAX`].
    /// Negative or NaN steps are ignored so progress never decreases.
    pub fn advance(&mut self, step: f32) -> Result<f32, TransitionError> {
        self.ensure(&[SessionState::Analyzing], Action::Progress)?;
        let step = if step.is_finite() && step > 0.0 { step } else { 0.0 };
        self.progress = (self.progress + step).min(PROGRESS_MAX);
        Ok(self.progress)
    }

    /// Analyzing → Results. The result is stored exactly once per cycle.
    pub fn complete(&mut self, analysis: Analysis) -> Result<(), TransitionError> {
        self.ensure(&[SessionState::Analyzing], Action::Complete)?;
        self.progress = PROGRESS_MAX;
        self.result = Some(analysis);
        self.state = SessionState::Results;
        Ok(())
    }

    /// Any in-flight state → Error. The photo is kept so a failed analysis
    /// can be retried.
    pub fn fail(&mut self, failure: Failure) -> Result<(), TransitionError> {
        self.ensure(
            &[
                SessionState::Idle,
                SessionState::RequestingPermission,
                SessionState::LivePreview,
                SessionState::Captured,
                SessionState::Analyzing,
            ],
            Action::Fail,
        )?;
        self.result = None;
        self.error = Some(failure);
        self.state = SessionState::Error;
        Ok(())
    }

    /// Apply a fresh permission probe: PermissionDenied when denied,
    /// otherwise back to a clean Idle.
    pub fn permission_checked(&mut self, denied: bool) -> Result<(), TransitionError> {
        self.ensure(
            &[
                SessionState::Idle,
                SessionState::Error,
                SessionState::PermissionDenied,
            ],
            Action::PermissionCheck,
        )?;
        self.photo = None;
        self.result = None;
        self.progress = 0.0;
        if denied {
            self.error = Some(Failure::Capture(CaptureError::NotAllowed));
            self.state = SessionState::PermissionDenied;
        } else {
            self.error = None;
            self.state = SessionState::Idle;
        }
        Ok(())
    }

    /// Discard this attempt. The replacement session starts Idle with a new id.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}
