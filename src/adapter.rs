//! C4: the polymorphic interface every backend implements, its lifecycle
//! state machine, and its feature flags (§4.4).

use std::path::Path;

use bitflags::bitflags;

use crate::bus::{Notification, Request};
use crate::error::Result;
use crate::ids::ProfileId;

bitflags! {
    /// Capability bits the UI/cache query to avoid issuing unsupported
    /// requests (§4.4).
    #[derive(Default)]
    pub struct Feature: u32 {
        /// Adapter pushes the initial chat list without being asked.
        const AUTO_GET_CHATS_ON_LOGIN = 0b0000_0001;
        const MULTIPLE_PROFILES       = 0b0000_0010;
        const EDIT_MESSAGES_CURRENT_DAY     = 0b0000_0100;
        const EDIT_MESSAGES_WITHIN_TWO_DAYS = 0b0000_1000;
        const EDIT_MESSAGES_MAX_48_HRS      = 0b0001_0000;
        const TYPING_TIMEOUT                = 0b0010_0000;
    }
}

/// Lifecycle state machine per adapter (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Loaded,
    LoggingIn,
    Online,
    Reconnecting,
    LoginFailed,
}

/// The contract every protocol backend implements.
///
/// Contract obligations (§4.4):
/// - the message handler is invoked only from the adapter's own worker
///   thread, never from the caller of [`ProtocolAdapter::send_request`];
/// - a successful [`ProtocolAdapter::login`] eventually delivers exactly one
///   `Connect{success: true}`; a failed login delivers `Connect{success:
///   false}` without leaving the adapter in `LoggingIn`;
/// - after [`ProtocolAdapter::logout`] returns, no further notifications are
///   emitted;
/// - `send_request` with an unrecognized variant emits a matching failure
///   notification rather than dropping it silently.
pub trait ProtocolAdapter: Send {
    /// Interactive one-time registration: backend login flow (QR scan, phone
    /// verification), writing durable state into the profile dir.
    fn setup_profile(&mut self, profiles_dir: &Path) -> Result<ProfileId>;

    /// Opens an existing profile; idempotent against cold start.
    fn load_profile(&mut self, profiles_dir: &Path, profile_id: &ProfileId) -> Result<()>;

    fn close_profile(&mut self) -> Result<()>;

    fn login(&mut self) -> Result<()>;

    fn logout(&mut self) -> Result<()>;

    /// Non-blocking enqueue; the adapter's own dispatcher (C5) drives this.
    fn send_request(&self, request: Request);

    /// Registers the single callback through which all notifications flow.
    fn set_message_handler(&mut self, handler: Box<dyn Fn(Notification) + Send + Sync>);

    fn has_feature(&self, feature: Feature) -> bool;

    fn get_profile_id(&self) -> ProfileId;

    fn get_profile_display_name(&self) -> String;

    fn get_self_id(&self) -> String;

    fn state(&self) -> AdapterState;
}
