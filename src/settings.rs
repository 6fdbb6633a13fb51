use crate::connection::codec::TransferEncoding;
use crate::connection::ConnectionOptions;
use crate::daemon::AcceptMode;
use crate::error::Error;
use crate::muted_error;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remote (engine) path prefix and its local counterpart.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathMapping {
    pub remote: String,
    pub local: String,
}

/// Debugger client settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Interface the daemon listens on.
    pub client_host_ip: String,
    pub debug_port: u16,
    /// Suspend the script on its first line.
    pub break_at_first_line: bool,
    pub use_ssl_encryption: bool,
    /// Encoding of text fields, `UTF-8` or `ISO-8859-1`.
    pub transfer_encoding: String,
    pub request_timeout_ms: Option<u64>,
    pub dispatch_queue_capacity: usize,
    pub max_frame_len: usize,
    pub accept_mode: AcceptMode,
    pub accept_poll_ms: u64,
    pub stop_timeout_ms: u64,
    /// Workspace root, used to answer engine requests for local file content.
    pub local_root: Option<PathBuf>,
    pub path_mappings: Vec<PathMapping>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_host_ip: "127.0.0.1".to_string(),
            debug_port: 10137,
            break_at_first_line: true,
            use_ssl_encryption: false,
            transfer_encoding: TransferEncoding::Utf8.to_string(),
            request_timeout_ms: None,
            dispatch_queue_capacity: 1024,
            max_frame_len: 64 * 1024 * 1024,
            accept_mode: AcceptMode::Repeat,
            accept_poll_ms: 50,
            stop_timeout_ms: 3000,
            local_root: None,
            path_mappings: vec![],
        }
    }
}

impl Settings {
    const DEFAULT_PATH: &'static str = ".config/zdb/config.toml";

    /// Parse settings from a TOML document, missing keys take default values.
    pub fn from_toml(data: &str) -> Result<Self, Error> {
        Ok(toml::de::from_str(data)?)
    }

    /// Load settings from `path`, or from `~/.config/zdb/config.toml` if no path is given.
    /// A missing default file means default settings.
    pub fn from_file(path: Option<&Path>) -> Result<Self, Error> {
        let data = match path {
            Some(path) => read_to_string(path)?,
            None => {
                let Some(home) = home::home_dir() else {
                    return Ok(Self::default());
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Ok(Self::default()),
                }
            }
        };
        Self::from_toml(&data)
    }

    pub fn encoding(&self) -> Result<TransferEncoding, Error> {
        self.transfer_encoding
            .parse()
            .map_err(|_| Error::UnsupportedEncoding(self.transfer_encoding.clone()))
    }

    pub fn connection_options(&self) -> Result<ConnectionOptions, Error> {
        Ok(ConnectionOptions {
            encoding: self.encoding()?,
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            dispatch_queue_capacity: self.dispatch_queue_capacity.max(1),
            max_frame_len: self.max_frame_len,
        })
    }
}
