pub mod audit;
pub mod config;
pub mod error;
pub mod exit;
pub mod http;
pub mod hub;
pub mod lifecycle;
pub mod navigate;
pub mod probe;
pub mod publish;
pub mod report;
pub mod session;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, RawSettings};
pub use error::RunError;
pub use exit::{exit_code, ExitCode};
pub use lifecycle::{Phase, RunOutcome, Runner, RunnerBuilder};
pub use report::Report;
