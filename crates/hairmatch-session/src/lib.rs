//! hairmatch-session: Photo acquisition and analysis session.
//!
//! [`SessionController`] drives one [`CaptureSession`] at a time from idle
//! through camera permission, live preview and capture (or file upload) to
//! analysis results, admitting each attempt through an [`EntitlementStore`]
//! and consuming the free trial when analysis starts.

pub mod config;
pub mod controller;
pub mod entitlement;
pub mod error;
pub mod session;
pub mod upgrade;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use controller::{ControllerSettings, InterruptHandle, Notice, SessionController, SessionSnapshot};
pub use entitlement::{EntitlementStore, FileEntitlements, MemoryEntitlements};
pub use error::{SessionError, TransitionError};
pub use session::{Action, CaptureSession, Failure, SessionState};
pub use upgrade::UpgradeFlow;
