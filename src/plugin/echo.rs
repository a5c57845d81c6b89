//! Echo behavior: every command is answered with its own text.
//!
//! Backs `--dry-run`, where real device transports are swapped out so a
//! suite can be exercised end to end without touching hardware. Also the
//! standard session double in tests.

use crate::plugin::{DeviceBehavior, DeviceSession, SessionError, SessionReply};
use crate::topo::Device;

#[derive(Debug)]
pub struct EchoBehavior;

impl EchoBehavior {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EchoBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBehavior for EchoBehavior {
    fn name(&self) -> &str {
        "echo"
    }

    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError> {
        Ok(Box::new(EchoSession {
            device: device.name.clone(),
            open: true,
            sent: Vec::new(),
        }))
    }
}

#[derive(Debug)]
pub struct EchoSession {
    device: String,
    open: bool,
    sent: Vec<String>,
}

impl EchoSession {
    /// Commands sent so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

impl DeviceSession for EchoSession {
    fn device_name(&self) -> &str {
        &self.device
    }

    fn send(&mut self, command: &str) -> Result<SessionReply, SessionError> {
        if !self.open {
            return Err(SessionError::new(
                crate::plugin::SessionErrorKind::Closed,
                format!("session to '{}' is closed", self.device),
            ));
        }
        self.sent.push(command.to_string());
        Ok(SessionReply::ok(command))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.open = false;
        Ok(())
    }
}
