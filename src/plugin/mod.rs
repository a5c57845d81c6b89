pub mod control;
pub mod echo;
pub mod pattern;
pub mod registry;
pub mod rest;
pub mod shell;

use std::fmt;

use crate::testcase::ParamMap;
use crate::topo::Device;

pub use pattern::RolePattern;
pub use registry::{
    AmbiguousPluginError, PluginRegistry, RegistryBuilder, ResolutionError, ResolutionErrorKind,
    SESSION_CAPABILITY,
};

/// Reply to one command sent through a device session.
///
/// `status` is the session's native success indicator: a process exit code
/// for shell sessions, an HTTP status for REST sessions, always 0 for echo
/// sessions. 0 means success for process-backed sessions; REST replies keep
/// the raw HTTP code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReply {
    pub output: String,
    pub status: i32,
}

impl SessionReply {
    /// A successful reply carrying the given output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status: 0,
        }
    }
}

/// A live handle on one device, exclusively owned by the execution unit
/// currently running.
///
/// Sessions are produced by a [`DeviceBehavior`] at bind time and dropped
/// (or closed) when the unit finishes.
pub trait DeviceSession: Send + fmt::Debug {
    /// Name of the device this session drives.
    fn device_name(&self) -> &str;

    /// Send one command and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the command cannot be delivered or
    /// the session has broken; a delivered command with a non-zero status
    /// is a normal reply, not an error.
    fn send(&mut self, command: &str) -> Result<SessionReply, SessionError>;

    fn is_open(&self) -> bool {
        true
    }

    /// Release the session. Dropping without closing is allowed.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when an orderly shutdown fails.
    fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// How to drive devices of a role: opens sessions.
///
/// Behaviors resolve through the registry under the reserved
/// [`SESSION_CAPABILITY`] with most-specific-role-wins matching.
pub trait DeviceBehavior: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Attributes a device must declare for this behavior to open it.
    /// Fed into the topology resolver's role catalog.
    fn required_attrs(&self) -> &[&str] {
        &[]
    }

    /// Open a session on the device.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the device cannot be reached or is
    /// missing required attributes.
    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError>;
}

/// A named control operation performed through an open session.
pub trait ControlMethod: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Perform the operation.
    ///
    /// # Errors
    ///
    /// Returns a [`ControlError`] for missing arguments or session
    /// failures.
    fn invoke(
        &self,
        session: &mut dyn DeviceSession,
        args: &ParamMap,
    ) -> Result<SessionReply, ControlError>;
}

/// Failure opening or driving a device session.
#[derive(Debug, Clone)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// The device could not be reached or opened.
    Unreachable,
    /// The session was closed or dropped mid-use.
    Closed,
    /// The command could not be delivered or executed.
    CommandFailed,
    /// A deadline expired while opening, claiming, or sending.
    Timeout,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionErrorKind::Unreachable => "device unreachable",
            SessionErrorKind::Closed => "session closed",
            SessionErrorKind::CommandFailed => "command failed",
            SessionErrorKind::Timeout => "timed out",
        };
        write!(f, "{text}")
    }
}

/// Failure inside a control-method invocation.
#[derive(Debug, Clone)]
pub struct ControlError {
    pub kind: ControlErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl ControlError {
    pub fn missing_argument(name: &str) -> Self {
        Self {
            kind: ControlErrorKind::MissingArgument,
            message: format!("argument '{name}' is required"),
            detail: None,
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ControlError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlErrorKind {
    MissingArgument,
    Session,
    Unsupported,
}

impl fmt::Display for ControlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ControlErrorKind::MissingArgument => "missing argument",
            ControlErrorKind::Session => "session failure",
            ControlErrorKind::Unsupported => "unsupported operation",
        };
        write!(f, "{text}")
    }
}

impl From<SessionError> for ControlError {
    fn from(err: SessionError) -> Self {
        Self {
            kind: ControlErrorKind::Session,
            message: err.message,
            detail: err.detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_reply_ok_has_status_zero() {
        let reply = SessionReply::ok("done");
        assert_eq!(reply.status, 0);
        assert_eq!(reply.output, "done");
    }

    #[test]
    fn session_error_display() {
        let err = SessionError::new(SessionErrorKind::Unreachable, "no route to 10.0.0.1")
            .with_detail("connect refused");
        assert_eq!(err.to_string(), "device unreachable: no route to 10.0.0.1");
        assert_eq!(err.detail.as_deref(), Some("connect refused"));
    }

    #[test]
    fn control_error_from_session_error() {
        let err: ControlError =
            SessionError::new(SessionErrorKind::Closed, "session dropped").into();
        assert_eq!(err.kind, ControlErrorKind::Session);
        assert_eq!(err.message, "session dropped");
    }

    #[test]
    fn control_missing_argument_names_it() {
        let err = ControlError::missing_argument("command");
        assert_eq!(err.to_string(), "missing argument: argument 'command' is required");
    }
}
