use crate::error::RunError;
use crate::lifecycle::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Passed,
    Failed,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            ExitCode::Passed => 0,
            ExitCode::Failed => 1,
        }
    }
}

/// Violations and fatal errors both fail the run.
pub fn exit_code(result: &Result<RunOutcome, RunError>) -> ExitCode {
    match result {
        Ok(outcome) if outcome.passed => ExitCode::Passed,
        _ => ExitCode::Failed,
    }
}
