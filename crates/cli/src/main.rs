//! coldsnap CLI entry point.

use clap::Parser;

mod commands;
mod config;
mod exit_code;
mod output;
mod session;

use exit_code::ExitCode;

#[derive(Parser)]
#[command(name = "coldsnap", about = "Differential btrfs snapshot backups to object storage")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match commands::run(cli.command) {
        Ok(()) => ExitCode::Success.into(),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from_error(&err).into()
        }
    }
}
