//! Scripted capture device and classifiers for controller tests.

use async_trait::async_trait;
use hairmatch_core::{Analysis, Classifier, ClassifierError, FaceShape, Photo};
use hairmatch_hw::{CaptureDevice, CaptureError, Frame, Permission, StreamConstraints, StreamHandle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// How the device answers an access request.
#[derive(Clone)]
pub enum AccessScript {
    Grant,
    Deny(CaptureError),
    /// Never answers, like an OS dialog the user ignores.
    Hang,
    /// Grants once the delay has passed.
    GrantAfter(Duration),
}

/// Observable side effects of a [`ScriptedDevice`].
#[derive(Default)]
pub struct DeviceLog {
    pub access_requests: AtomicUsize,
    pub previews: AtomicUsize,
    pub releases: Mutex<Vec<u64>>,
    pub live: Mutex<Option<u64>>,
}

impl DeviceLog {
    pub fn access_requests(&self) -> usize {
        self.access_requests.load(Ordering::SeqCst)
    }

    pub fn previews(&self) -> usize {
        self.previews.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> Vec<u64> {
        self.releases.lock().unwrap().clone()
    }

    pub fn live(&self) -> Option<u64> {
        *self.live.lock().unwrap()
    }
}

pub struct ScriptedDevice {
    access: AccessScript,
    frames: Mutex<VecDeque<Result<Frame, CaptureError>>>,
    permission: Mutex<Permission>,
    changes: Option<watch::Receiver<Permission>>,
    next_id: AtomicU64,
    log: Arc<DeviceLog>,
}

impl ScriptedDevice {
    pub fn new(access: AccessScript) -> Self {
        Self {
            access,
            frames: Mutex::new(VecDeque::new()),
            permission: Mutex::new(Permission::Unknown),
            changes: None,
            next_id: AtomicU64::new(1),
            log: Arc::new(DeviceLog::default()),
        }
    }

    pub fn granting() -> Self {
        Self::new(AccessScript::Grant)
    }

    /// Frames returned by successive captures; a ready frame once exhausted.
    pub fn with_frames(self, frames: Vec<Result<Frame, CaptureError>>) -> Self {
        *self.frames.lock().unwrap() = frames.into();
        self
    }

    pub fn with_permission(self, permission: Permission) -> Self {
        *self.permission.lock().unwrap() = permission;
        self
    }

    pub fn with_permission_changes(mut self, rx: watch::Receiver<Permission>) -> Self {
        self.changes = Some(rx);
        self
    }

    pub fn log(&self) -> Arc<DeviceLog> {
        self.log.clone()
    }

    fn open_stream(&self) -> StreamHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut live = self.log.live.lock().unwrap();
        assert!(live.is_none(), "second stream acquired while one is live");
        *live = Some(id);
        StreamHandle::new(id)
    }
}

pub fn ready_frame() -> Frame {
    Frame::new(vec![140u8; 16], 4, 4, 1)
}

pub fn empty_frame() -> Frame {
    Frame::new(Vec::new(), 0, 0, 0)
}

/// Encoded bytes of a small valid image, as an upload would provide.
pub fn png_bytes() -> Vec<u8> {
    Photo::from_luma(8, 8, vec![100u8; 64])
        .unwrap()
        .bytes()
        .to_vec()
}

/// First half of a PNG: the header is intact, the pixel data is cut short.
pub fn truncated_png_bytes() -> Vec<u8> {
    let pixels: Vec<u8> = (0..64 * 64).map(|i| (i * 13 % 256) as u8).collect();
    let full = Photo::from_luma(64, 64, pixels).unwrap().bytes().to_vec();
    full[..full.len() / 2].to_vec()
}

#[async_trait]
impl CaptureDevice for ScriptedDevice {
    fn query_permission(&self) -> Permission {
        *self.permission.lock().unwrap()
    }

    fn permission_changes(&self) -> Option<watch::Receiver<Permission>> {
        self.changes.clone()
    }

    async fn request_access(
        &self,
        _constraints: &StreamConstraints,
    ) -> Result<StreamHandle, CaptureError> {
        self.log.access_requests.fetch_add(1, Ordering::SeqCst);
        match &self.access {
            AccessScript::Grant => Ok(self.open_stream()),
            AccessScript::GrantAfter(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(self.open_stream())
            }
            AccessScript::Deny(err) => Err(err.clone()),
            AccessScript::Hang => std::future::pending().await,
        }
    }

    fn attach_preview(&self, _stream: &StreamHandle) {
        self.log.previews.fetch_add(1, Ordering::SeqCst);
    }

    fn capture_frame(&self, _stream: &StreamHandle) -> Result<Frame, CaptureError> {
        self.frames
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ready_frame()))
    }

    fn release(&self, stream: &StreamHandle) {
        self.log.releases.lock().unwrap().push(stream.id());
        let mut live = self.log.live.lock().unwrap();
        if *live == Some(stream.id()) {
            *live = None;
        }
    }
}

/// Fails the first `failures` calls, then answers a fixed result.
pub struct FlakyClassifier {
    failures: AtomicUsize,
    calls: Arc<AtomicUsize>,
}

impl FlakyClassifier {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, readable after the classifier is moved away.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Classifier for FlakyClassifier {
    async fn analyze(&self, _photo: &Photo) -> Result<Analysis, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ClassifierError::AnalysisFailed("model unavailable".into()));
        }
        Ok(Analysis {
            face_shape: FaceShape::Heart,
            confidence: 93,
        })
    }
}
