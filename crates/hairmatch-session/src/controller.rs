//! Session controller: drives a [`CaptureSession`] through the camera or
//! upload path, gates entry on the entitlement store, and runs analysis.
//!
//! Each public action runs to completion before the next one is accepted
//! (`&mut self`). The two long suspensions, the camera permission request
//! and the analysis, race against an [`InterruptHandle`] so another task
//! can cancel them. The progress ticker lives inside the analysis future
//! and is dropped with it, whichever way analysis ends.

use crate::entitlement::EntitlementStore;
use crate::error::SessionError;
use crate::session::{Action, CaptureSession, Failure, SessionState, PROGRESS_MAX};
use hairmatch_core::{Analysis, Classifier, Photo};
use hairmatch_hw::{CaptureDevice, CaptureError, Permission, StreamConstraints, StreamHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Progress increment bound used when the configured one is unusable.
pub const DEFAULT_MAX_PROGRESS_STEP: f32 = 15.0;

/// Timing and stream parameters.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Interval between progress ticks while analyzing.
    pub tick: Duration,
    /// Pause after progress reaches 100 before the classifier runs.
    pub settle: Duration,
    /// Upper bound of one random progress increment.
    pub max_progress_step: f32,
    pub constraints: StreamConstraints,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            settle: Duration::from_millis(500),
            max_progress_step: DEFAULT_MAX_PROGRESS_STEP,
            constraints: StreamConstraints::default(),
        }
    }
}

impl ControllerSettings {
    /// Increment bound actually used by the ticker. Zero, negative or
    /// non-finite bounds would stall progress below 100 forever.
    pub fn effective_max_step(&self) -> f32 {
        if self.max_progress_step.is_finite() && self.max_progress_step > 0.0 {
            self.max_progress_step
        } else {
            DEFAULT_MAX_PROGRESS_STEP
        }
    }
}

/// Transient message for the presentation layer; does not change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Free trial spent and no premium entitlement.
    TrialExpired,
    /// Capture pressed before the camera produced a frame.
    FrameNotReady,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::TrialExpired => {
                "Your free trial has ended. Upgrade to premium to keep analyzing photos."
            }
            Notice::FrameNotReady => CaptureError::FrameNotReady.remediation(),
        }
    }
}

/// Everything the presentation layer needs to render the current state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub photo: Option<Arc<Photo>>,
    pub progress: f32,
    pub result: Option<Analysis>,
    pub error: Option<Failure>,
    pub permission: Permission,
    pub notice: Option<Notice>,
}

/// Cancels whatever the controller is currently awaiting.
///
/// Only interrupts raised after a suspension began affect it; an interrupt
/// sent while the controller is idle is ignored.
#[derive(Clone)]
pub struct InterruptHandle {
    tx: Arc<watch::Sender<u64>>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

pub struct SessionController<D: CaptureDevice, C: Classifier> {
    store: Arc<dyn EntitlementStore>,
    device: D,
    classifier: C,
    settings: ControllerSettings,
    session: CaptureSession,
    stream: Option<StreamHandle>,
    permission: Permission,
    permission_rx: Option<watch::Receiver<Permission>>,
    notice: Option<Notice>,
    rng: StdRng,
    interrupt_tx: Arc<watch::Sender<u64>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<D: CaptureDevice, C: Classifier> SessionController<D, C> {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        device: D,
        classifier: C,
        settings: ControllerSettings,
    ) -> Self {
        let permission_rx = device.permission_changes();
        let permission = match &permission_rx {
            Some(rx) => *rx.borrow(),
            None => device.query_permission(),
        };
        let session = CaptureSession::new();
        let (interrupt_tx, _) = watch::channel(0u64);
        let (snapshot_tx, _) = watch::channel(snapshot_of(&session, permission, None));

        tracing::debug!(session = %session.id(), ?permission, "session controller ready");

        Self {
            store,
            device,
            classifier,
            settings,
            session,
            stream: None,
            permission,
            permission_rx,
            notice: None,
            rng: StdRng::from_entropy(),
            interrupt_tx: Arc::new(interrupt_tx),
            snapshot_tx,
        }
    }

    /// Seed the progress increments, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        snapshot_of(&self.session, self.permission, self.notice)
    }

    /// Receive a snapshot on every transition and progress tick.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            tx: self.interrupt_tx.clone(),
        }
    }

    /// Idle → RequestingPermission → LivePreview (or Error).
    pub async fn start_camera(&mut self) -> Result<SessionState, SessionError> {
        self.session.ensure(&[SessionState::Idle], Action::StartCamera)?;
        self.admit(Action::StartCamera)?;

        self.session.begin_permission_request()?;
        self.publish();
        tracing::info!(session = %self.session.id(), "requesting camera access");

        let mut interrupt = self.interrupts();
        let outcome = tokio::select! {
            biased;
            _ = interrupt.changed() => None,
            res = self.device.request_access(&self.settings.constraints) => Some(res),
        };

        match outcome {
            None => {
                self.session.cancel()?;
                tracing::info!(session = %self.session.id(), "camera request cancelled");
            }
            Some(Ok(stream)) => {
                self.device.attach_preview(&stream);
                self.stream = Some(stream);
                self.permission = Permission::Granted;
                self.session.access_granted()?;
                tracing::info!(session = %self.session.id(), "live preview started");
            }
            Some(Err(err)) => {
                if err == CaptureError::NotAllowed {
                    self.permission = Permission::Denied;
                }
                tracing::warn!(session = %self.session.id(), error = %err, "camera access failed");
                self.session.fail(Failure::Capture(err))?;
            }
        }

        self.publish();
        Ok(self.session.state())
    }

    /// Keep the preview running for `duration`, e.g. while the sensor
    /// settles. An interrupt meanwhile cancels the camera flow.
    pub async fn hold_preview(&mut self, duration: Duration) -> Result<SessionState, SessionError> {
        self.session.ensure(&[SessionState::LivePreview], Action::HoldPreview)?;

        let mut interrupt = self.interrupts();
        let interrupted = tokio::select! {
            biased;
            _ = interrupt.changed() => true,
            _ = tokio::time::sleep(duration) => false,
        };

        if interrupted {
            tracing::info!(session = %self.session.id(), "preview interrupted");
            return self.cancel();
        }
        Ok(self.session.state())
    }

    /// LivePreview → Captured → Analyzing → Results.
    ///
    /// A frame that is not ready yet leaves the preview running and returns
    /// [`CaptureError::FrameNotReady`].
    pub async fn capture(&mut self) -> Result<SessionState, SessionError> {
        self.session.ensure(&[SessionState::LivePreview], Action::Capture)?;
        let Some(stream) = self.stream.as_ref() else {
            // Preview without a stream cannot happen through the public API.
            self.session.fail(Failure::Capture(CaptureError::Unknown(
                "preview has no stream".into(),
            )))?;
            self.publish();
            return Ok(self.session.state());
        };

        let frame = match self.device.capture_frame(stream) {
            Ok(frame) if frame.is_ready() => frame,
            Ok(_) | Err(CaptureError::FrameNotReady) => {
                tracing::debug!(session = %self.session.id(), "capture pressed before first frame");
                self.notice = Some(Notice::FrameNotReady);
                self.publish();
                return Err(CaptureError::FrameNotReady.into());
            }
            Err(err) => {
                tracing::warn!(session = %self.session.id(), error = %err, "frame capture failed");
                self.release_stream();
                self.session.fail(Failure::Capture(err))?;
                self.publish();
                return Ok(self.session.state());
            }
        };

        self.release_stream();
        self.notice = None;

        match Photo::from_luma(frame.width, frame.height, frame.data) {
            Ok(photo) => {
                self.session.capture_still(photo)?;
                self.publish();
                self.analyze().await
            }
            Err(e) => {
                self.session.fail(Failure::InvalidPhoto(e.to_string()))?;
                self.publish();
                Ok(self.session.state())
            }
        }
    }

    /// Idle → Captured → Analyzing → Results, from uploaded file bytes.
    pub async fn upload(&mut self, bytes: Vec<u8>) -> Result<SessionState, SessionError> {
        self.session.ensure(&[SessionState::Idle], Action::Upload)?;
        self.admit(Action::Upload)?;

        match Photo::decode(bytes) {
            Ok(photo) => {
                tracing::info!(
                    session = %self.session.id(),
                    width = photo.width(),
                    height = photo.height(),
                    "photo uploaded"
                );
                self.session.upload(photo)?;
                self.publish();
                self.analyze().await
            }
            Err(e) => {
                tracing::warn!(session = %self.session.id(), error = %e, "upload rejected");
                self.session.fail(Failure::InvalidPhoto(e.to_string()))?;
                self.publish();
                Ok(self.session.state())
            }
        }
    }

    /// Error → Analyzing → Results, reusing the photo of a failed analysis.
    ///
    /// Belongs to the same attempt, so it is not gated again.
    pub async fn retry_analysis(&mut self) -> Result<SessionState, SessionError> {
        self.session.ensure(&[SessionState::Error], Action::RetryAnalysis)?;
        self.analyze().await
    }

    /// Stop the camera flow and go back to Idle.
    pub fn cancel(&mut self) -> Result<SessionState, SessionError> {
        self.session.cancel()?;
        self.release_stream();
        self.notice = None;
        tracing::info!(session = %self.session.id(), "camera cancelled");
        self.publish();
        Ok(self.session.state())
    }

    /// Discard the current attempt from any state. Entitlements are untouched.
    pub fn reset(&mut self) -> SessionState {
        self.release_stream();
        let previous = self.session.id();
        self.session.reset();
        self.notice = None;
        tracing::info!(previous = %previous, session = %self.session.id(), "session reset");
        self.publish();
        self.session.state()
    }

    /// Re-probe camera permission after the user changed it outside the app.
    pub fn retry_permission_check(&mut self) -> Result<Permission, SessionError> {
        self.session.ensure(
            &[
                SessionState::Idle,
                SessionState::Error,
                SessionState::PermissionDenied,
            ],
            Action::PermissionCheck,
        )?;

        self.permission = match self.permission_rx.as_mut() {
            Some(rx) => *rx.borrow_and_update(),
            None => self.device.query_permission(),
        };
        self.session
            .permission_checked(self.permission == Permission::Denied)?;
        self.notice = None;

        tracing::info!(session = %self.session.id(), permission = ?self.permission, "permission re-checked");
        self.publish();
        Ok(self.permission)
    }

    /// Admission guard shared by the camera and upload paths.
    fn admit(&mut self, action: Action) -> Result<(), SessionError> {
        if self.store.can_start_analysis() {
            self.notice = None;
            return Ok(());
        }
        tracing::info!(session = %self.session.id(), %action, "blocked: free trial used");
        self.notice = Some(Notice::TrialExpired);
        self.publish();
        Err(SessionError::EntitlementDenied)
    }

    /// Captured (or retryable Error) → Analyzing → Results | Error.
    async fn analyze(&mut self) -> Result<SessionState, SessionError> {
        self.session.begin_analysis()?;
        if !self.store.is_premium() {
            self.store.mark_free_trial_used();
        }
        self.publish();

        let Some(photo) = self.session.photo().cloned() else {
            self.session
                .fail(Failure::AnalysisFailed("no photo to analyze".into()))?;
            self.publish();
            return Ok(self.session.state());
        };

        tracing::info!(session = %self.session.id(), "analysis started");
        let mut interrupt = self.interrupts();

        let max_step = self.settings.effective_max_step();
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        while self.session.progress() < PROGRESS_MAX {
            tokio::select! {
                biased;
                _ = interrupt.changed() => return Ok(self.abort_analysis()),
                _ = ticker.tick() => {
                    let step = self.rng.gen::<f32>() * max_step;
                    self.session.advance(step)?;
                    self.publish();
                }
            }
        }
        drop(ticker);

        tokio::select! {
            biased;
            _ = interrupt.changed() => return Ok(self.abort_analysis()),
            _ = tokio::time::sleep(self.settings.settle) => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = interrupt.changed() => None,
            res = self.classifier.analyze(&photo) => Some(res),
        };

        match outcome {
            None => return Ok(self.abort_analysis()),
            Some(Ok(analysis)) => {
                tracing::info!(
                    session = %self.session.id(),
                    face_shape = %analysis.face_shape,
                    confidence = analysis.confidence,
                    "analysis complete"
                );
                self.session.complete(analysis)?;
            }
            Some(Err(e)) => {
                tracing::warn!(session = %self.session.id(), error = %e, "analysis failed");
                self.session.fail(Failure::AnalysisFailed(e.to_string()))?;
            }
        }

        self.publish();
        Ok(self.session.state())
    }

    fn abort_analysis(&mut self) -> SessionState {
        tracing::info!(session = %self.session.id(), "analysis interrupted");
        self.reset()
    }

    /// Receiver that only fires for interrupts raised from now on.
    fn interrupts(&self) -> watch::Receiver<u64> {
        let mut rx = self.interrupt_tx.subscribe();
        let _ = rx.borrow_and_update();
        rx
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.device.release(&stream);
            tracing::debug!(session = %self.session.id(), stream = stream.id(), "stream released");
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

impl<D: CaptureDevice, C: Classifier> Drop for SessionController<D, C> {
    fn drop(&mut self) {
        self.release_stream();
    }
}

fn snapshot_of(
    session: &CaptureSession,
    permission: Permission,
    notice: Option<Notice>,
) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session.id(),
        state: session.state(),
        photo: session.photo().cloned(),
        progress: session.progress(),
        result: session.result().copied(),
        error: session.error().cloned(),
        permission,
        notice,
    }
}
