//! hairmatch-hw: Hardware abstraction for camera capture.
//!
//! Defines the [`CaptureDevice`] capability the session controller drives
//! (permission probe, stream acquisition and release, still capture) and a
//! V4L2-backed implementation for Linux webcams.

pub mod camera;
pub mod device;
pub mod frame;

pub use camera::V4l2Camera;
pub use device::{CaptureDevice, CaptureError, FacingMode, Permission, StreamConstraints, StreamHandle};
pub use frame::Frame;
