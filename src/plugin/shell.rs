//! Shell behavior: commands run on the local host through a shell.
//!
//! Covers bench setups where the "device" is the machine the engine runs
//! on (traffic generator hosts, capture boxes). Every `send` spawns one
//! shell invocation; there is no persistent shell process, so commands do
//! not share state.

use std::process::Command;
use std::time::Instant;

use crate::plugin::{DeviceBehavior, DeviceSession, SessionError, SessionErrorKind, SessionReply};
use crate::topo::Device;

#[derive(Debug)]
pub struct ShellBehavior {
    /// Shell interpreter (default: "/bin/sh").
    pub shell: String,
    /// Flags passed before the command string (default: ["-c"]).
    pub shell_args: Vec<String>,
}

impl ShellBehavior {
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            shell_args: vec!["-c".to_string()],
        }
    }
}

impl Default for ShellBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBehavior for ShellBehavior {
    fn name(&self) -> &str {
        "shell"
    }

    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError> {
        Ok(Box::new(ShellSession {
            device: device.name.clone(),
            shell: self.shell.clone(),
            shell_args: self.shell_args.clone(),
            open: true,
        }))
    }
}

#[derive(Debug)]
pub struct ShellSession {
    device: String,
    shell: String,
    shell_args: Vec<String>,
    open: bool,
}

impl DeviceSession for ShellSession {
    fn device_name(&self) -> &str {
        &self.device
    }

    fn send(&mut self, command: &str) -> Result<SessionReply, SessionError> {
        if !self.open {
            return Err(SessionError::new(
                SessionErrorKind::Closed,
                format!("session to '{}' is closed", self.device),
            ));
        }

        let start = Instant::now();
        let mut cmd = Command::new(&self.shell);
        for arg in &self.shell_args {
            cmd.arg(arg);
        }
        cmd.arg(command);

        let output = cmd.output().map_err(|e| {
            SessionError::new(
                SessionErrorKind::CommandFailed,
                format!("failed to spawn {}: {}", self.shell, e),
            )
        })?;

        tracing::trace!(
            device = %self.device,
            status = output.status.code().unwrap_or(-1),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "shell command finished"
        );

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(SessionReply {
            output: text,
            status: output.status.code().unwrap_or(-1),
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.open = false;
        Ok(())
    }
}
