// folio CLI entry point.

use std::process;

use clap::Parser;

mod commands;
mod exit_code;
mod output;

#[derive(Parser)]
#[command(name = "folio", about = "Inspect and sync block documents")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::run(cli.command) {
        Ok(()) => exit_code::ExitCode::Success.into(),
        Err(e) => exit_code::ExitCode::from_error(&e).into(),
    }
}
