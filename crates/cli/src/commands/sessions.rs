use crate::commands::{load_config, runtime, CommandResult};
use zapwoot_core::domain::session::Session;
use zapwoot_db::connect_with_config;
use zapwoot_db::repositories::{SessionRepository, SqlSessionRepository};

pub fn run() -> CommandResult {
    let config = match load_config("sessions") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("sessions") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let sessions = SqlSessionRepository::new(pool.clone())
            .list()
            .await
            .map_err(|error| ("persistence", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<Vec<Session>, (&'static str, String, u8)>(sessions)
    });

    match result {
        Ok(sessions) => CommandResult::success("sessions", render(&sessions)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sessions", error_class, message, exit_code)
        }
    }
}

fn render(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "no stored sessions".to_string();
    }

    let mut lines = vec![format!("{} stored session(s):", sessions.len())];
    for session in sessions {
        let mut line = format!("- {} [{}]", session.id, session.connection_state);
        if !session.name.is_empty() {
            line.push_str(&format!(" name={}", session.name));
        }
        if let Some(device_jid) = &session.device_jid {
            line.push_str(&format!(" device={device_jid}"));
        }
        if session.qr_code.is_some() {
            line.push_str(" awaiting_scan");
        }
        if let Some(error) = &session.last_error {
            line.push_str(&format!(" last_error=\"{error}\""));
        }
        lines.push(line);
    }

    lines.join("\n")
}
