use std::{fmt, io};

use log::SetLoggerError;

/// Reasons `init` can refuse to install the logger.
#[derive(Debug)]
pub enum InitError {
    /// A logger is already installed for this process.
    AlreadyInitialized(SetLoggerError),
    /// Binding or configuring the log socket failed.
    Socket(io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InitError::AlreadyInitialized(err) => write!(f, "{err}"),
            InitError::Socket(err) => write!(f, "log socket: {err}"),
        }
    }
}

impl std::error::Error for InitError {}

impl From<SetLoggerError> for InitError {
    fn from(err: SetLoggerError) -> Self {
        InitError::AlreadyInitialized(err)
    }
}
