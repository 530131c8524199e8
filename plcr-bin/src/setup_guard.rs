use plcr_app_config::{ExitCode, LOG_ENV};
use plcr_logger_service::LoggerInitGuard;

use crate::setup::Setup;

pub struct SetupGuard {
    _logger_guard: LoggerInitGuard,
}

impl SetupGuard {
    pub fn from_setup(setup: &Setup) -> Result<SetupGuard, ExitCode> {
        let logger_config = plcr_logger_service::Config {
            filter: setup.config.log_filter.clone(),
            log_to_stdout: true,
            color: true,
            socket_path: Some(setup.config.log_socket.clone()),
        };
        let logger_guard =
            plcr_logger_service::init(Some(LOG_ENV), logger_config).map_err(|err| {
                eprintln!("Logger Error: {err}");
                ExitCode::Failure
            })?;
        Ok(SetupGuard {
            _logger_guard: logger_guard,
        })
    }
}
