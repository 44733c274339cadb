use std::process::ExitCode;

fn main() -> ExitCode {
    zapwoot_cli::run()
}
