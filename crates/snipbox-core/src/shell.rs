//! Serialization of an execution plan into a container entry command.

use crate::planner::{CommandLine, ExecutionPlan, Stage};

pub const SHELL: &str = "/bin/sh";

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | '+' | ',')
}

/// Quotes `arg` for a POSIX shell; plain words are left untouched.
pub fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().all(is_safe_char) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

pub fn shell_join(command: &CommandLine) -> String {
    command
        .argv()
        .iter()
        .map(|arg| shell_escape(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Joins the plan into one shell line.
///
/// Stages before teardown are chained with `&&`, so a failed install shows up
/// in stderr and the exit code without running the snippet. Teardown always
/// runs, and the chain's exit status is restored afterwards.
pub fn shell_line(plan: &ExecutionPlan) -> String {
    let (teardown, main): (Vec<&Stage>, Vec<&Stage>) =
        plan.stages().iter().partition(|stage| stage.is_teardown());

    let main_line = main
        .iter()
        .map(|stage| shell_join(stage.command()))
        .collect::<Vec<_>>()
        .join(" && ");

    if teardown.is_empty() {
        return main_line;
    }

    let teardown_line = teardown
        .iter()
        .map(|stage| shell_join(stage.command()))
        .collect::<Vec<_>>()
        .join("; ");

    if main_line.is_empty() {
        return teardown_line;
    }
    format!("{}; status=$?; {}; exit $status", main_line, teardown_line)
}

/// Container entry command: the stage's own argv when the plan has one stage,
/// otherwise `/bin/sh -c "<joined stages>"`.
pub fn entry_command(plan: &ExecutionPlan) -> Vec<String> {
    if let [only] = plan.stages() {
        return only.command().argv();
    }
    vec![SHELL.to_string(), "-c".to_string(), shell_line(plan)]
}
