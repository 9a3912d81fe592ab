use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::auth::{AuthError, Credentials};
use crate::session::{DEFAULT_PROMPT, InteractionMode, SessionOptions};
use crate::terminal::cli::ConnectionArgs;
use crate::transport::websocket::WebSocketConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine home directory")]
    NoHome,
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Contents of `~/.upservx/terminal.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub mode: Option<InteractionMode>,
    pub prompt: Option<String>,
    pub submit_suffix: Option<String>,
    pub enter_sequence: Option<String>,
    pub normalize_newlines: Option<bool>,
    pub token: Option<String>,
    pub username: Option<String>,
}

impl FileConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = BaseDirs::new().ok_or(ConfigError::NoHome)?;
        Ok(base.home_dir().join(".upservx").join("terminal.toml"))
    }

    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A missing file is only an error when the path was asked for explicitly.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                debug!(path = %path.display(), "loaded terminal config");
                Self::parse(&raw, path)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub mode: InteractionMode,
    pub prompt: String,
    pub submit_suffix: String,
    pub enter_sequence: String,
    pub normalize_newlines: bool,
    pub token: Option<String>,
    pub username: Option<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            tls: false,
            mode: InteractionMode::Raw,
            prompt: DEFAULT_PROMPT.to_string(),
            submit_suffix: "\n".to_string(),
            enter_sequence: "\n".to_string(),
            normalize_newlines: true,
            token: None,
            username: None,
        }
    }
}

impl TerminalConfig {
    /// Defaults, then the config file, then environment and flags.
    pub fn resolve(args: &ConnectionArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path, true)?,
            None => match FileConfig::default_path() {
                Ok(path) => FileConfig::load(&path, false)?,
                Err(ConfigError::NoHome) => FileConfig::default(),
                Err(err) => return Err(err),
            },
        };
        let mut config = Self::default();
        config.apply_file(file);
        config.apply_args(args);
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(tls) = file.tls {
            self.tls = tls;
        }
        if let Some(mode) = file.mode {
            self.mode = mode;
        }
        if let Some(prompt) = file.prompt {
            self.prompt = prompt;
        }
        if let Some(suffix) = file.submit_suffix {
            self.submit_suffix = suffix;
        }
        if let Some(enter) = file.enter_sequence {
            self.enter_sequence = enter;
        }
        if let Some(normalize) = file.normalize_newlines {
            self.normalize_newlines = normalize;
        }
        if file.token.is_some() {
            self.token = file.token;
        }
        if file.username.is_some() {
            self.username = file.username;
        }
    }

    pub fn apply_args(&mut self, args: &ConnectionArgs) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(tls) = args.tls {
            self.tls = tls;
        }
        if let Some(mode) = args.mode {
            self.mode = mode;
        }
        if let Some(prompt) = &args.prompt {
            self.prompt = prompt.clone();
        }
        // A login given on the command line wins over a stored token.
        if let Some(username) = &args.username {
            self.username = Some(username.clone());
            self.token = None;
        }
        if let Some(token) = &args.token {
            self.token = Some(token.clone());
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            prompt_template: self.prompt.clone(),
            submit_suffix: self.submit_suffix.clone(),
            enter_sequence: self.enter_sequence.clone(),
        }
    }

    /// Token if one is configured, otherwise prompt for the user's password.
    pub fn credentials(&self) -> Result<Option<Credentials>, AuthError> {
        if let Some(token) = &self.token {
            return Credentials::from_token(token.as_str()).map(Some);
        }
        match &self.username {
            Some(username) => Credentials::prompt_for(username).map(Some),
            None => Ok(None),
        }
    }

    pub fn websocket(&self, credentials: Option<Credentials>) -> WebSocketConfig {
        WebSocketConfig::new(self.host.clone(), self.port)
            .with_tls(self.tls)
            .with_credentials(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> FileConfig {
        FileConfig::parse(raw, Path::new("terminal.toml")).unwrap()
    }

    #[test]
    fn defaults_match_the_host_service() {
        let config = TerminalConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert!(!config.tls);
        assert_eq!(config.mode, InteractionMode::Raw);
        assert_eq!(config.prompt, "root@{target}:~$ ");
        assert_eq!(config.submit_suffix, "\n");
        assert!(config.normalize_newlines);
    }

    #[test]
    fn file_overrides_defaults() {
        let file = parse(
            r#"
            host = "upservx.lan"
            port = 8443
            tls = true
            mode = "line"
            submit_suffix = "\r"
            normalize_newlines = false
            "#,
        );
        let mut config = TerminalConfig::default();
        config.apply_file(file);
        assert_eq!(config.host, "upservx.lan");
        assert_eq!(config.port, 8443);
        assert!(config.tls);
        assert_eq!(config.mode, InteractionMode::LineBuffered);
        assert_eq!(config.submit_suffix, "\r");
        assert!(!config.normalize_newlines);
        assert_eq!(config.enter_sequence, "\n");
    }

    #[test]
    fn args_override_file() {
        let mut config = TerminalConfig::default();
        config.apply_file(parse("host = \"file-host\"\nport = 1\ntoken = \"c3RvcmVk\""));
        config.apply_args(&ConnectionArgs {
            port: Some(2),
            mode: Some(InteractionMode::LineBuffered),
            username: Some("admin".into()),
            ..ConnectionArgs::default()
        });
        assert_eq!(config.host, "file-host");
        assert_eq!(config.port, 2);
        assert_eq!(config.mode, InteractionMode::LineBuffered);
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert!(config.token.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = FileConfig::parse("hots = \"typo\"", Path::new("terminal.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_optional_file_is_empty() {
        let path = std::env::temp_dir().join(format!("upservx-missing-{}.toml", uuid::Uuid::new_v4()));
        assert_eq!(FileConfig::load(&path, false).unwrap(), FileConfig::default());
        assert!(matches!(
            FileConfig::load(&path, true),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn explicit_config_file_is_read() {
        let path = std::env::temp_dir().join(format!("upservx-term-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "port = 9001\nprompt = \"{target}# \"").unwrap();
        let config = TerminalConfig::resolve(&ConnectionArgs {
            config: Some(path.clone()),
            ..ConnectionArgs::default()
        })
        .unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(config.port, 9001);
        assert_eq!(config.session_options().prompt_template, "{target}# ");
    }

    #[test]
    fn token_becomes_credentials_without_prompting() {
        let config = TerminalConfig {
            token: Some("YWRtaW46c2VjcmV0".into()),
            ..TerminalConfig::default()
        };
        let credentials = config.credentials().unwrap().unwrap();
        assert_eq!(credentials.token(), "YWRtaW46c2VjcmV0");
        assert!(TerminalConfig::default().credentials().unwrap().is_none());
    }

    #[test]
    fn websocket_config_carries_connection_settings() {
        let config = TerminalConfig {
            host: "localhost".into(),
            port: 8001,
            tls: true,
            ..TerminalConfig::default()
        };
        let ws = config.websocket(None);
        assert_eq!(ws.port, 8001);
        assert!(ws.use_tls);
        assert!(ws.credentials.is_none());
    }
}
