//! Camera capability consumed by the session controller.

use crate::frame::Frame;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera access was denied")]
    NotAllowed,
    #[error("no camera found")]
    NotFound,
    #[error("camera capture is not supported on this platform")]
    NotSupported,
    #[error("camera is in use by another application")]
    Busy,
    #[error("camera has not produced a frame yet")]
    FrameNotReady,
    #[error("camera error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// User-facing text explaining how to recover.
    pub fn remediation(&self) -> &'static str {
        match self {
            CaptureError::NotAllowed => {
                "Camera permission was denied. Allow camera access in your system or browser settings, then retry."
            }
            CaptureError::NotFound => "No camera was found on this device. Connect a camera or upload a photo instead.",
            CaptureError::NotSupported => {
                "This platform does not support camera access. Upload a photo instead."
            }
            CaptureError::Busy => {
                "The camera is being used by another application. Close it and try again."
            }
            CaptureError::FrameNotReady => "The camera is still starting up. Wait a moment and capture again.",
            CaptureError::Unknown(_) => "Could not access the camera. Try again or upload a photo instead.",
        }
    }
}

/// Result of a non-blocking camera permission probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// The platform cannot report permission state.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

/// Preferred stream parameters. Devices treat the sizes as hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            ideal_width: 640,
            ideal_height: 480,
        }
    }
}

/// Exclusive handle to a live camera stream.
///
/// Not `Clone`: whoever holds the handle owns the stream and is responsible
/// for passing it to [`CaptureDevice::release`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    id: u64,
}

impl StreamHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Camera hardware as seen by the session controller.
///
/// At most one stream is live at a time; acquiring a second stream without
/// releasing the first is a caller error.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Probe the current permission state without prompting the user.
    fn query_permission(&self) -> Permission;

    /// Permission change notifications, if the platform delivers them.
    /// Callers fall back to polling [`query_permission`](Self::query_permission).
    fn permission_changes(&self) -> Option<watch::Receiver<Permission>> {
        None
    }

    /// Ask for camera access and open a stream. Suspends until the user or
    /// platform answers.
    async fn request_access(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<StreamHandle, CaptureError>;

    /// Start rendering live frames for the stream.
    fn attach_preview(&self, stream: &StreamHandle);

    /// Grab the current frame as a grayscale still.
    fn capture_frame(&self, stream: &StreamHandle) -> Result<Frame, CaptureError>;

    /// Stop the stream's hardware tracks. Idempotent.
    fn release(&self, stream: &StreamHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_error_has_remediation() {
        let all = [
            CaptureError::NotAllowed,
            CaptureError::NotFound,
            CaptureError::NotSupported,
            CaptureError::Busy,
            CaptureError::FrameNotReady,
            CaptureError::Unknown("boom".into()),
        ];
        for err in all {
            assert!(!err.remediation().is_empty(), "{err:?}");
        }
    }

    #[test]
    fn test_default_constraints_prefer_front_camera() {
        let c = StreamConstraints::default();
        assert_eq!(c.facing, FacingMode::User);
        assert_eq!((c.ideal_width, c.ideal_height), (640, 480));
    }
}
