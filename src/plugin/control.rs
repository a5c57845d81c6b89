//! Control methods shipped with the engine.

use crate::plugin::{ControlError, ControlMethod, DeviceSession, SessionReply};
use crate::testcase::ParamMap;

/// The `exec` capability: run one command and hand back the reply.
///
/// Arguments: `command` (required).
#[derive(Debug)]
pub struct ExecControl;

impl ControlMethod for ExecControl {
    fn name(&self) -> &str {
        "exec"
    }

    fn invoke(
        &self,
        session: &mut dyn DeviceSession,
        args: &ParamMap,
    ) -> Result<SessionReply, ControlError> {
        let command = args
            .get("command")
            .ok_or_else(|| ControlError::missing_argument("command"))?;
        Ok(session.send(command)?)
    }
}

/// The `reboot` capability: send the platform's reboot command.
///
/// The command is fixed per registration, so one registry can map
/// `reboot` to different commands per role pattern.
#[derive(Debug)]
pub struct RebootControl {
    pub command: String,
}

impl RebootControl {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for RebootControl {
    fn default() -> Self {
        Self::new("reboot")
    }
}

impl ControlMethod for RebootControl {
    fn name(&self) -> &str {
        "reboot"
    }

    fn invoke(
        &self,
        session: &mut dyn DeviceSession,
        _args: &ParamMap,
    ) -> Result<SessionReply, ControlError> {
        tracing::info!(device = session.device_name(), "rebooting device");
        Ok(session.send(&self.command)?)
    }
}
