pub mod auth;
pub mod input;
pub mod render;
pub mod session;
pub mod telemetry;
pub mod terminal;
pub mod transport;
pub mod tty;
