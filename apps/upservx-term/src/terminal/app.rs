use std::io::IsTerminal;

use tracing::{debug, info};

use crate::session::{SessionState, Target};
use crate::telemetry::logging;
use crate::terminal::cli::Cli;
use crate::terminal::config::TerminalConfig;
use crate::terminal::error::CliError;
use crate::terminal::runner;
use crate::transport::websocket::WebSocketConnector;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let owns_tty = std::io::stdout().is_terminal();
    logging::init(&cli.logging.to_config(owns_tty)).map_err(|err| CliError::Logging(err.to_string()))?;

    let config = TerminalConfig::resolve(&cli.connection)?;
    debug!(host = %config.host, port = config.port, tls = config.tls, mode = ?config.mode, "resolved terminal config");

    // Prompting needs a cooked tty, so credentials come before the session.
    let credentials = config.credentials()?;
    let connector = WebSocketConnector::new(config.websocket(credentials));
    let target = Target::new(cli.kind, cli.name);

    let end = runner::run(target, &config, &connector).await?;
    info!(state = %end.state, "terminal session finished");
    match end.state {
        SessionState::Errored => Err(CliError::Disconnected(
            end.notice.unwrap_or_else(|| "connection failed".to_string()),
        )),
        _ => Ok(()),
    }
}
