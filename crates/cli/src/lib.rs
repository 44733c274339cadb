pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "zapwoot",
    about = "Zapwoot operator CLI",
    long_about = "Operate the WhatsApp to Chatwoot bridge: migrations, readiness checks, config inspection, and stored sessions.",
    after_help = "Examples:\n  zapwoot doctor --json\n  zapwoot config\n  zapwoot sessions"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Chatwoot readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List stored WhatsApp sessions with their connection state")]
    Sessions,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Sessions => commands::sessions::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
