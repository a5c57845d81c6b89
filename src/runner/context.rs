use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::plan::types::RoleBinding;
use crate::plugin::{DeviceSession, PluginRegistry, SessionReply};
use crate::testcase::{CaseError, ParamMap};
use crate::topo::{Device, Topology};

/// Best-effort per-unit record of commands, replies, and testcase notes.
///
/// Transcript writes never affect the unit verdict; a transcript without a
/// backing file swallows everything.
#[derive(Debug, Default)]
pub struct Transcript {
    file: Option<File>,
    path: Option<PathBuf>,
}

impl Transcript {
    /// A transcript that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Start a fresh transcript at `path`, truncating any previous one.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be created.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Some(file),
            path: Some(path.to_path_buf()),
        })
    }

    /// Reopen an existing transcript for appending. Retry attempts land in
    /// the same file as the first.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be opened.
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(file),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A section marker, such as the attempt header.
    pub fn heading(&mut self, text: &str) {
        self.put(&format!("== {text}"));
    }

    /// A free-form line from the testcase.
    pub fn note(&mut self, text: &str) {
        self.put(&format!("-- {text}"));
    }

    /// A command about to be sent to a device.
    pub fn command(&mut self, device: &str, command: &str) {
        self.put(&format!(">> {device}: {command}"));
    }

    /// The reply to the last command, output indented under the status.
    pub fn reply(&mut self, reply: &SessionReply) {
        self.put(&format!("<< status {}", reply.status));
        for line in reply.output.lines() {
            self.put(&format!("   {line}"));
        }
    }

    fn put(&mut self, line: &str) {
        if let Some(file) = &mut self.file {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// The open sessions a unit drives, grouped by role in binding order.
#[derive(Default)]
pub struct SessionSet {
    entries: Vec<(String, Vec<Box<dyn DeviceSession>>)>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the sessions for one role. Call in binding order.
    pub fn insert(&mut self, role: &str, sessions: Vec<Box<dyn DeviceSession>>) {
        self.entries.push((role.to_string(), sessions));
    }

    /// The session bound to a role slot.
    pub fn get_mut(&mut self, role: &str, slot: usize) -> Option<&mut dyn DeviceSession> {
        let (_, sessions) = self.entries.iter_mut().find(|(r, _)| r == role)?;
        Some(sessions.get_mut(slot)?.as_mut())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, s)| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every session. Failures are logged, not raised; the unit
    /// verdict is already decided by the time sessions close.
    pub fn close_all(&mut self) {
        for (_, sessions) in &mut self.entries {
            for session in sessions {
                if let Err(err) = session.close() {
                    tracing::warn!(
                        device = session.device_name(),
                        error = %err,
                        "session close failed"
                    );
                }
            }
        }
    }
}

/// What a running testcase phase sees: its validated parameters, the
/// sessions of its bound devices, control-method resolution, and read
/// access to the topology.
pub struct TestContext<'a> {
    params: &'a ParamMap,
    binding: &'a RoleBinding,
    sessions: &'a mut SessionSet,
    registry: &'a PluginRegistry,
    topology: &'a Topology,
    transcript: &'a mut Transcript,
}

impl<'a> TestContext<'a> {
    pub fn new(
        params: &'a ParamMap,
        binding: &'a RoleBinding,
        sessions: &'a mut SessionSet,
        registry: &'a PluginRegistry,
        topology: &'a Topology,
        transcript: &'a mut Transcript,
    ) -> Self {
        Self {
            params,
            binding,
            sessions,
            registry,
            topology,
            transcript,
        }
    }

    /// A required parameter value.
    ///
    /// # Errors
    ///
    /// Parameters were validated at plan time, so a miss means the testcase
    /// asked for a name outside its own schema. That is an internal error.
    pub fn param(&self, name: &str) -> Result<&str, CaseError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| CaseError::internal(format!("parameter '{name}' is not set")))
    }

    /// An optional parameter value.
    pub fn param_opt(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// A parameter parsed as an integer.
    ///
    /// # Errors
    ///
    /// As [`Self::param`], plus an internal error when the value does not
    /// parse.
    pub fn param_int(&self, name: &str) -> Result<i64, CaseError> {
        let raw = self.param(name)?;
        raw.parse().map_err(|_| {
            CaseError::internal(format!("parameter '{name}' is not an integer: '{raw}'"))
        })
    }

    /// A parameter parsed as a float.
    ///
    /// # Errors
    ///
    /// As [`Self::param_int`].
    pub fn param_float(&self, name: &str) -> Result<f64, CaseError> {
        let raw = self.param(name)?;
        raw.parse().map_err(|_| {
            CaseError::internal(format!("parameter '{name}' is not a number: '{raw}'"))
        })
    }

    /// A parameter parsed as a flag, accepting the same spellings the
    /// schema's bool type accepts.
    ///
    /// # Errors
    ///
    /// As [`Self::param_int`].
    pub fn param_flag(&self, name: &str) -> Result<bool, CaseError> {
        let raw = self.param(name)?;
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(CaseError::internal(format!(
                "parameter '{name}' is not a flag: '{raw}'"
            ))),
        }
    }

    /// The device bound to a role slot.
    ///
    /// # Errors
    ///
    /// Internal error for a role or slot outside the unit's binding.
    pub fn device(&self, role: &str, slot: usize) -> Result<&Device, CaseError> {
        let binding: &RoleBinding = self.binding;
        let topology: &Topology = self.topology;
        let name = binding
            .device(role, slot)
            .ok_or_else(|| CaseError::internal(format!("role '{role}' slot {slot} is not bound")))?;
        topology.device(name).ok_or_else(|| {
            CaseError::internal(format!("bound device '{name}' is not in the topology"))
        })
    }

    /// Send a command through the session bound to a role slot.
    ///
    /// # Errors
    ///
    /// Session failures surface as session-kind errors; a delivered command
    /// with a non-zero status is a normal reply.
    pub fn exec(&mut self, role: &str, slot: usize, command: &str) -> Result<SessionReply, CaseError> {
        let binding: &RoleBinding = self.binding;
        let device = binding
            .device(role, slot)
            .ok_or_else(|| CaseError::internal(format!("role '{role}' slot {slot} is not bound")))?
            .to_string();
        self.transcript.command(&device, command);
        let session = self.sessions.get_mut(role, slot).ok_or_else(|| {
            CaseError::internal(format!("no open session for role '{role}' slot {slot}"))
        })?;
        match session.send(command) {
            Ok(reply) => {
                self.transcript.reply(&reply);
                Ok(reply)
            }
            Err(err) => {
                self.transcript.note(&format!("send failed: {err}"));
                Err(err.into())
            }
        }
    }

    /// Invoke a control method on the device bound to a role slot.
    ///
    /// # Errors
    ///
    /// Registry resolution failures classify as resolution errors; the
    /// invocation itself raises session-kind errors.
    pub fn control(
        &mut self,
        capability: &str,
        role: &str,
        slot: usize,
        args: &ParamMap,
    ) -> Result<SessionReply, CaseError> {
        let binding: &RoleBinding = self.binding;
        let topology: &Topology = self.topology;
        let name = binding
            .device(role, slot)
            .ok_or_else(|| CaseError::internal(format!("role '{role}' slot {slot} is not bound")))?;
        let device = topology.device(name).ok_or_else(|| {
            CaseError::internal(format!("bound device '{name}' is not in the topology"))
        })?;
        let method = self.registry.control_for(capability, device)?;
        self.transcript.note(&format!("control '{capability}' on {name}"));
        let session = self.sessions.get_mut(role, slot).ok_or_else(|| {
            CaseError::internal(format!("no open session for role '{role}' slot {slot}"))
        })?;
        match method.invoke(session, args) {
            Ok(reply) => {
                self.transcript.reply(&reply);
                Ok(reply)
            }
            Err(err) => {
                self.transcript.note(&format!("control failed: {err}"));
                Err(err.into())
            }
        }
    }

    /// The unit's role binding.
    pub fn binding(&self) -> &RoleBinding {
        self.binding
    }

    /// Read access to the resolved topology.
    pub fn topology(&self) -> &Topology {
        self.topology
    }

    /// Append a free-form line to the unit transcript.
    pub fn note(&mut self, text: &str) {
        self.transcript.note(text);
    }
}
