//! Built-in testcases shipped with the engine.
//!
//! Both are single-device smoke tests driven entirely by parameters, which
//! makes them natural targets for data files: one row per command to run.

use crate::runner::context::TestContext;
use crate::testcase::{
    CaseError, CaseResult, ParamSchema, ParamType, Testcase, TopologyNeeds, check,
};

/// Run a command on a `node` device and check its reply.
///
/// Parameters: `command` (required), `status` (expected exit status,
/// default 0), `expect` (optional substring the output must contain).
pub struct ExecCheck;

impl Testcase for ExecCheck {
    fn name(&self) -> &str {
        "exec_check"
    }

    fn description(&self) -> &str {
        "run a command on a node and check exit status and output"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
            .required("command", ParamType::Str)
            .optional("status", ParamType::Int, Some("0"))
            .optional("expect", ParamType::Str, None)
    }

    fn needs(&self) -> TopologyNeeds {
        TopologyNeeds::new().role("node", 1)
    }

    fn body(&self, cx: &mut TestContext<'_>) -> CaseResult {
        let command = cx.param("command")?.to_string();
        let want_status = cx.param_int("status")?;
        let expect = cx.param_opt("expect").map(str::to_string);

        let reply = cx.exec("node", 0, &command)?;
        if i64::from(reply.status) != want_status {
            return Err(CaseError::assertion(format!(
                "command exited with status {}, expected {}",
                reply.status, want_status
            ))
            .with_detail(reply.output));
        }
        if let Some(needle) = expect
            && !reply.output.contains(&needle)
        {
            return Err(CaseError::assertion(format!(
                "output does not contain '{needle}'"
            ))
            .with_detail(reply.output));
        }
        Ok(())
    }
}

/// Verify the bound `node` session answers a probe command with status 0.
pub struct SessionCheck;

impl Testcase for SessionCheck {
    fn name(&self) -> &str {
        "session_check"
    }

    fn description(&self) -> &str {
        "verify the device session responds to a probe command"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new().optional("probe", ParamType::Str, Some("true"))
    }

    fn needs(&self) -> TopologyNeeds {
        TopologyNeeds::new().role("node", 1)
    }

    fn body(&self, cx: &mut TestContext<'_>) -> CaseResult {
        let probe = cx.param("probe")?.to_string();
        let reply = cx.exec("node", 0, &probe)?;
        check(
            reply.status == 0,
            format!("probe '{probe}' replied with status {}", reply.status),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_check_declares_schema_and_needs() {
        let case = ExecCheck;
        assert_eq!(case.name(), "exec_check");
        let schema = case.schema();
        let names: Vec<&str> = schema.specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["command", "status", "expect"]);
        assert!(schema.specs()[0].required);
        assert_eq!(schema.specs()[1].default.as_deref(), Some("0"));

        let needs = case.needs();
        assert_eq!(needs.roles.len(), 1);
        assert_eq!(needs.roles[0].role, "node");
        assert_eq!(needs.roles[0].count, 1);
    }

    #[test]
    fn session_check_probe_defaults_to_true() {
        let case = SessionCheck;
        assert_eq!(case.name(), "session_check");
        let schema = case.schema();
        assert_eq!(schema.specs()[0].name, "probe");
        assert_eq!(schema.specs()[0].default.as_deref(), Some("true"));
    }
}
