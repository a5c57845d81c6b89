//! REST behavior: commands go to a device's HTTP management endpoint.
//!
//! The device must declare a `base_url` attribute. Each command is POSTed
//! as a plain-text body to `<base_url>/run`; the response body becomes the
//! reply output. A 2xx response maps to command status 0, anything else to
//! the HTTP status code. The session is lazy: nothing is sent at open
//! time, so unreachable devices surface on the first command.

use std::time::Duration;

use ureq::Agent;

use crate::plugin::{DeviceBehavior, DeviceSession, SessionError, SessionErrorKind, SessionReply};
use crate::topo::Device;

const COMMAND_PATH: &str = "/run";

#[derive(Debug)]
pub struct RestBehavior {
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestBehavior {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for RestBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBehavior for RestBehavior {
    fn name(&self) -> &str {
        "rest"
    }

    fn required_attrs(&self) -> &[&str] {
        &["base_url"]
    }

    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError> {
        let base_url = device.attr("base_url").ok_or_else(|| {
            SessionError::new(
                SessionErrorKind::Unreachable,
                format!("device '{}' has no base_url attribute", device.name),
            )
        })?;

        let config = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(self.timeout))
            .build();

        Ok(Box::new(RestSession {
            device: device.name.clone(),
            endpoint: join_url(base_url, COMMAND_PATH),
            agent: Agent::new_with_config(config),
            open: true,
        }))
    }
}

#[derive(Debug)]
pub struct RestSession {
    device: String,
    endpoint: String,
    agent: Agent,
    open: bool,
}

impl DeviceSession for RestSession {
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

        let result = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "text/plain")
            .send(command.as_bytes());

        match result {
            Ok(mut resp) => {
                let http_status = resp.status().as_u16();
                let body = resp.body_mut().read_to_string().map_err(|e| {
                    SessionError::new(
                        SessionErrorKind::CommandFailed,
                        format!("failed to read response body: {e}"),
                    )
                })?;

                tracing::trace!(
                    device = %self.device,
                    http_status,
                    "rest command finished"
                );

                Ok(SessionReply {
                    output: body,
                    status: if (200..300).contains(&http_status) {
                        0
                    } else {
                        i32::from(http_status)
                    },
                })
            }
            Err(e) => Err(SessionError::new(
                SessionErrorKind::Unreachable,
                format!("request to '{}' failed: {e}", self.device),
            )
            .with_detail(self.endpoint.clone())),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.open = false;
        Ok(())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn device_with_url(url: &str) -> Device {
        let mut attrs = BTreeMap::new();
        attrs.insert("base_url".to_string(), url.to_string());
        Device {
            name: "fw-1".to_string(),
            role: "firewall".to_string(),
            attrs,
        }
    }

    #[test]
    fn requires_base_url_attribute() {
        assert_eq!(RestBehavior::new().required_attrs(), ["base_url"]);
    }

    #[test]
    fn open_without_base_url_is_unreachable() {
        let behavior = RestBehavior::new();
        let bare = Device {
            name: "fw-1".to_string(),
            role: "firewall".to_string(),
            attrs: BTreeMap::new(),
        };
        let err = behavior.open(&bare).unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::Unreachable);
        assert!(err.message.contains("base_url"));
    }

    #[test]
    fn open_is_lazy() {
        // No request happens at open time, so any URL works here.
        let behavior = RestBehavior::new();
        let session = behavior
            .open(&device_with_url("http://127.0.0.1:19999"))
            .unwrap();
        assert_eq!(session.device_name(), "fw-1");
        assert!(session.is_open());
    }

    #[test]
    fn unreachable_endpoint_surfaces_on_send() {
        // Use a port that's (almost certainly) not running a server.
        let behavior = RestBehavior {
            timeout: Duration::from_secs(2),
        };
        let mut session = behavior
            .open(&device_with_url("http://127.0.0.1:19999"))
            .unwrap();

        let err = session.send("show version").unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::Unreachable);
        assert_eq!(err.detail.as_deref(), Some("http://127.0.0.1:19999/run"));
    }

    #[test]
    fn join_url_strips_trailing_slash() {
        assert_eq!(join_url("http://h:8080/", "/run"), "http://h:8080/run");
        assert_eq!(join_url("http://h:8080", "/run"), "http://h:8080/run");
    }
}
