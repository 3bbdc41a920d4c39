//! V4L2 camera capture via the `v4l` crate.

use crate::device::{CaptureDevice, CaptureError, Permission, StreamConstraints, StreamHandle};
use crate::frame::{self, Frame};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

/// An opened device node with its negotiated format.
struct OpenStream {
    id: u64,
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    previewing: bool,
}

/// V4L2 webcam exposed as a [`CaptureDevice`].
///
/// Permission is probed by opening the device node read/write, which is what
/// the kernel checks when the stream is opened. Linux has no permission
/// change notification for device nodes, so callers poll.
///
/// There is no preview surface: `attach_preview` only marks the stream as
/// previewing and logs it. Frames are pulled on demand by `capture_frame`.
pub struct V4l2Camera {
    device_path: String,
    next_id: AtomicU64,
    active: Mutex<Option<OpenStream>>,
}

impl V4l2Camera {
    /// Camera for a device node (e.g., "/dev/video0"). Nothing is opened
    /// until [`CaptureDevice::request_access`].
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<OpenStream>> {
        // A poisoned lock only means a capture panicked mid-way; the slot
        // itself is still consistent.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CaptureDevice for V4l2Camera {
    fn query_permission(&self) -> Permission {
        match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device_path)
        {
            Ok(_) => Permission::Granted,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Permission::Denied,
            Err(e) => {
                tracing::debug!(device = %self.device_path, error = %e, "permission probe inconclusive");
                Permission::Unknown
            }
        }
    }

    async fn request_access(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<StreamHandle, CaptureError> {
        if self.lock_active().is_some() {
            tracing::warn!(device = %self.device_path, "stream requested while another is live");
            return Err(CaptureError::Busy);
        }

        let path = self.device_path.clone();
        let constraints = constraints.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let stream = tokio::task::spawn_blocking(move || open_stream(id, &path, &constraints))
            .await
            .map_err(|e| CaptureError::Unknown(format!("camera open task failed: {e}")))??;

        let mut active = self.lock_active();
        if active.is_some() {
            // Lost a race with a concurrent request; dropping `stream` closes it.
            return Err(CaptureError::Busy);
        }
        *active = Some(stream);
        Ok(StreamHandle::new(id))
    }

    fn attach_preview(&self, stream: &StreamHandle) {
        let mut active = self.lock_active();
        match active.as_mut() {
            Some(open) if open.id == stream.id() => {
                open.previewing = true;
                tracing::info!(
                    device = %self.device_path,
                    stream = open.id,
                    width = open.width,
                    height = open.height,
                    "preview attached"
                );
            }
            _ => tracing::warn!(stream = stream.id(), "preview requested for inactive stream"),
        }
    }

    fn capture_frame(&self, stream: &StreamHandle) -> Result<Frame, CaptureError> {
        let active = self.lock_active();
        let open = match active.as_ref() {
            Some(open) if open.id == stream.id() => open,
            _ => return Err(CaptureError::Unknown("stream is not active".into())),
        };

        let mut mmap = MmapStream::with_buffers(&open.device, BufType::VideoCapture, 4)
            .map_err(|e| CaptureError::Unknown(format!("failed to create mmap stream: {e}")))?;
        let (buf, meta) = mmap
            .next()
            .map_err(|e| CaptureError::Unknown(format!("failed to dequeue buffer: {e}")))?;

        if open.width == 0 || open.height == 0 || buf.is_empty() {
            return Err(CaptureError::FrameNotReady);
        }

        let gray = match open.pixel_format {
            PixelFormat::Grey => {
                let pixels = (open.width * open.height) as usize;
                if buf.len() < pixels {
                    return Err(CaptureError::FrameNotReady);
                }
                buf[..pixels].to_vec()
            }
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, open.width, open.height)
                .map_err(|_| CaptureError::FrameNotReady)?,
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, open.width, open.height)
                .map_err(|_| CaptureError::FrameNotReady)?,
        };

        let frame = Frame::new(gray, open.width, open.height, meta.sequence);
        if frame.is_dark {
            tracing::warn!(seq = meta.sequence, "captured frame is mostly dark");
        }
        Ok(frame)
    }

    fn release(&self, stream: &StreamHandle) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|open| open.id == stream.id()) {
            // Dropping the device closes the fd and stops streaming.
            if let Some(open) = active.take() {
                tracing::info!(
                    device = %self.device_path,
                    stream = open.id,
                    previewing = open.previewing,
                    "stream released"
                );
            }
        } else {
            tracing::debug!(stream = stream.id(), "release of inactive stream ignored");
        }
    }
}

/// Open the device node and negotiate a grayscale-convertible format.
fn open_stream(
    id: u64,
    device_path: &str,
    constraints: &StreamConstraints,
) -> Result<OpenStream, CaptureError> {
    if !Path::new(device_path).exists() {
        return Err(CaptureError::NotFound);
    }

    let device = Device::with_path(device_path).map_err(|e| classify_open_error(device_path, &e))?;

    let caps = device
        .query_caps()
        .map_err(|e| CaptureError::Unknown(format!("failed to query capabilities: {e}")))?;

    tracing::info!(
        device = device_path,
        driver = %caps.driver,
        card = %caps.card,
        "opened camera"
    );

    if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
        return Err(CaptureError::NotSupported);
    }

    let mut fmt = device
        .format()
        .map_err(|e| CaptureError::Unknown(format!("failed to get format: {e}")))?;
    fmt.fourcc = FourCC::new(b"YUYV");
    fmt.width = constraints.ideal_width;
    fmt.height = constraints.ideal_height;

    let negotiated = device
        .set_format(&fmt)
        .map_err(|e| classify_open_error(device_path, &e))?;

    let fourcc = negotiated.fourcc;
    let pixel_format = if fourcc == FourCC::new(b"YUYV") {
        PixelFormat::Yuyv
    } else if fourcc == FourCC::new(b"GREY") {
        PixelFormat::Grey
    } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
        PixelFormat::Y16
    } else {
        tracing::warn!(fourcc = ?fourcc, "unsupported pixel format");
        return Err(CaptureError::NotSupported);
    };

    tracing::info!(
        width = negotiated.width,
        height = negotiated.height,
        fourcc = ?fourcc,
        "negotiated format"
    );

    Ok(OpenStream {
        id,
        device,
        width: negotiated.width,
        height: negotiated.height,
        pixel_format,
        previewing: false,
    })
}

fn classify_open_error(device_path: &str, e: &io::Error) -> CaptureError {
    let msg = e.to_string();
    match e.kind() {
        io::ErrorKind::PermissionDenied => CaptureError::NotAllowed,
        io::ErrorKind::NotFound => CaptureError::NotFound,
        _ if msg.contains("busy") || msg.contains("EBUSY") => CaptureError::Busy,
        _ => CaptureError::Unknown(format!("{device_path}: {msg}")),
    }
}
