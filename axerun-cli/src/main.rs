mod cli;

use std::process;

use axerun::config::SystemConfig;
use axerun::http::build_client;
use axerun::{exit_code, Config, RawSettings, RunError, RunOutcome, RunnerBuilder};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = cli.settings();
    let system = SystemConfig::from_settings(&settings);
    init_tracing(&cli, &system);

    let result = run(settings).await;

    if let Err(err) = &result {
        eprintln!("error: {err}");
        if system.debug {
            if let Some(cause) = err.cause() {
                eprintln!("{cause:?}");
            }
        }
    }

    process::exit(exit_code(&result).as_i32());
}

fn init_tracing(cli: &Cli, system: &SystemConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(cli.level_filter(system).into()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(settings: RawSettings) -> Result<RunOutcome, RunError> {
    let config = Config::resolve(settings)?;
    let client = build_client(&config.network)
        .map_err(|e| RunError::Configuration(format!("{e:#}")))?;

    let runner = RunnerBuilder::new(config, client).build();
    let mut stdout = std::io::stdout();
    runner.run(&mut stdout).await
}
