//! PLCR runtime configuration.
//!
//! The persistent state directory holds everything the runtime owns at a
//! well-known path: the `.env` runtime configuration, the plugin list, the
//! control and log sockets, and whatever the management front end stores
//! next to them. This crate resolves and creates that directory, parses
//! `.env` into a typed [`RuntimeConfig`], and owns the process [`ExitCode`]s.

pub mod cli;

mod env_file;
mod exit_code;

#[cfg(test)]
mod tests;

pub use env_file::parse_env_file;
pub use exit_code::ExitCode;

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default state directory when neither the CLI nor the environment names one.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/plcr";
/// Environment variable naming the state directory.
pub const STATE_DIR_ENV: &str = "PLCR_STATE_DIR";
/// Environment variable overriding the log filter, read at logger init.
pub const LOG_ENV: &str = "PLCR_LOG";

/// `.env` key: control-program module path.
pub const KEY_PROGRAM: &str = "PLC_PROGRAM";
/// `.env` key: start the scan cycle immediately.
pub const KEY_AUTOSTART: &str = "PLC_AUTOSTART";
/// `.env` key: plugin list file.
pub const KEY_PLUGINS: &str = "PLC_PLUGINS";
/// `.env` key: log filter directives.
pub const KEY_LOG_FILTER: &str = "PLC_LOG_FILTER";

const ENV_FILE_NAME: &str = ".env";
const PLUGINS_FILE_NAME: &str = "plugins.cfg";
const CONTROL_SOCKET_NAME: &str = "control.sock";
const LOG_SOCKET_NAME: &str = "log.sock";

/// The state directory must be writable by the management front end running
/// under the same group.
const STATE_DIR_MODE: u32 = 0o770;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("state directory {path}: {source}")]
    StateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed {file} line {line}: {content}")]
    Malformed {
        file: PathBuf,
        line: usize,
        content: String,
    },
}

/// Typed view of the `.env` runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub state_dir: PathBuf,
    /// Control-program module; `None` selects the built-in blank program.
    pub program_path: Option<PathBuf>,
    pub autostart: bool,
    pub plugins_config: PathBuf,
    pub log_filter: Option<String>,
    pub control_socket: PathBuf,
    pub log_socket: PathBuf,
}

impl RuntimeConfig {
    /// Loads `<state_dir>/.env`, falling back to defaults for missing keys.
    /// A missing `.env` file is not an error: a fresh install has none.
    pub fn load(state_dir: &Path) -> Result<RuntimeConfig, ConfigError> {
        let env_path = state_dir.join(ENV_FILE_NAME);
        let values = if env_path.exists() {
            parse_env_file(&env_path)?
        } else {
            HashMap::new()
        };
        Ok(Self::from_values(state_dir, &values))
    }

    fn from_values(state_dir: &Path, values: &HashMap<String, String>) -> RuntimeConfig {
        let autostart = values
            .get(KEY_AUTOSTART)
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(true);
        let plugins_config = values
            .get(KEY_PLUGINS)
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir.join(PLUGINS_FILE_NAME));
        RuntimeConfig {
            state_dir: state_dir.to_path_buf(),
            program_path: values.get(KEY_PROGRAM).map(PathBuf::from),
            autostart,
            plugins_config,
            log_filter: values.get(KEY_LOG_FILTER).cloned(),
            control_socket: state_dir.join(CONTROL_SOCKET_NAME),
            log_socket: state_dir.join(LOG_SOCKET_NAME),
        }
    }
}

/// Resolves the state directory: CLI argument, then `PLCR_STATE_DIR`, then
/// the built-in default.
pub fn resolve_state_dir(cli_arg: Option<&str>) -> PathBuf {
    cli_arg
        .map(PathBuf::from)
        .or_else(|| std::env::var(STATE_DIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
}

/// Creates the state directory if needed and makes it group-writable.
pub fn init_state_dir(state_dir: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(state_dir).map_err(|source| ConfigError::StateDir {
        path: state_dir.to_path_buf(),
        source,
    })?;
    fs::set_permissions(state_dir, fs::Permissions::from_mode(STATE_DIR_MODE)).map_err(
        |source| ConfigError::StateDir {
            path: state_dir.to_path_buf(),
            source,
        },
    )
}
