pub mod dbus;
pub mod gate;
pub mod handle;
pub mod logind;
pub mod manager;
pub mod polkit;
pub mod pump;

pub use handle::{session_channel, HandleError, SessionHandle, StatusReport};
pub use manager::{IgnoreTimeouts, PermissionTimeoutHook, SessionManager};
