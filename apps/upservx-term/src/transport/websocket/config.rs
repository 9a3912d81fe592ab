use url::Url;

use crate::auth::Credentials;
use crate::session::Target;
use crate::transport::TransportError;

/// Where the host exposes its terminal sockets and how to authenticate.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub host: String,
    pub port: u16,
    /// Whether to use TLS (wss:// vs ws://)
    pub use_tls: bool,
    pub credentials: Option<Credentials>,
}

impl WebSocketConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls: false,
            credentials: None,
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Build `ws[s]://host:port/<kind>/<name>/terminal` for a target.
    pub fn url_for(&self, target: &Target) -> Result<Url, TransportError> {
        let scheme = if self.use_tls { "wss" } else { "ws" };

        // Normalize localhost to avoid IPv6 issues
        let host = if self.host.eq_ignore_ascii_case("localhost") {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };

        let base = format!("{scheme}://{host}:{}/", self.port);
        let mut url = Url::parse(&base).map_err(|err| TransportError::InvalidUrl(format!("{base}: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(base.clone()))?
            .clear()
            .push(target.kind.path_segment())
            .push(&target.name)
            .push("terminal");
        Ok(url)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8000)
    }
}
