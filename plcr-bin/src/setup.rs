use std::path::PathBuf;

use clap::ArgMatches;
use plcr_app_config::{cli, init_state_dir, resolve_state_dir, ExitCode, RuntimeConfig};

/// Everything needed to start the plcr process.
pub struct Setup {
    pub config: RuntimeConfig,
}

impl Setup {
    /// Resolves the state directory, creates it, loads `.env`, and applies
    /// the command-line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Setup, ExitCode> {
        let state_dir = resolve_state_dir(
            matches
                .get_one::<String>(cli::ARG_STATE_DIR)
                .map(String::as_str),
        );
        init_state_dir(&state_dir).map_err(|err| {
            eprintln!("IO Error: {err}");
            ExitCode::Io
        })?;
        let mut config = RuntimeConfig::load(&state_dir).map_err(|err| {
            eprintln!("Config Error: {err}");
            ExitCode::Config
        })?;
        if let Some(program) = matches.get_one::<String>(cli::ARG_PROGRAM) {
            config.program_path = Some(PathBuf::from(program));
        }
        if matches.get_flag(cli::ARG_NO_AUTOSTART) {
            config.autostart = false;
        }
        Ok(Setup { config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_env_configuration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "PLC_PROGRAM=/opt/plc/uploaded.so\nPLC_AUTOSTART=true\n",
        )
        .unwrap();
        let matches = cli::basic_app().get_matches_from([
            "plcr",
            "--state-dir",
            dir.path().to_str().unwrap(),
            "--program",
            "/tmp/override.so",
            "--no-autostart",
        ]);
        let setup = Setup::from_matches(&matches).unwrap();
        assert_eq!(
            setup.config.program_path,
            Some(PathBuf::from("/tmp/override.so"))
        );
        assert!(!setup.config.autostart);
    }
}
