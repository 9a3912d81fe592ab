use crate::auth::AuthError;
use crate::session::SessionError;
use crate::terminal::config::ConfigError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("session ended with an error: {0}")]
    Disconnected(String),
}
