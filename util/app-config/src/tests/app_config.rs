use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::{init_state_dir, parse_env_file, RuntimeConfig};

fn mkdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("app_config_test")
        .tempdir()
        .unwrap()
}

#[test]
fn defaults_without_env_file() {
    let dir = mkdir();
    let config = RuntimeConfig::load(dir.path()).unwrap();
    assert_eq!(config.program_path, None);
    assert!(config.autostart);
    assert_eq!(config.plugins_config, dir.path().join("plugins.cfg"));
    assert_eq!(config.control_socket, dir.path().join("control.sock"));
    assert_eq!(config.log_socket, dir.path().join("log.sock"));
    assert_eq!(config.log_filter, None);
}

#[test]
fn env_file_overrides_defaults() {
    let dir = mkdir();
    fs::write(
        dir.path().join(".env"),
        "# runtime configuration\n\
         PLC_PROGRAM=/opt/plc/program.so\n\
         PLC_AUTOSTART=false\n\
         PLC_PLUGINS=\"/etc/plcr/plugins.cfg\"\n\
         PLC_LOG_FILTER=debug\n",
    )
    .unwrap();
    let config = RuntimeConfig::load(dir.path()).unwrap();
    assert_eq!(
        config.program_path,
        Some(PathBuf::from("/opt/plc/program.so"))
    );
    assert!(!config.autostart);
    assert_eq!(config.plugins_config, PathBuf::from("/etc/plcr/plugins.cfg"));
    assert_eq!(config.log_filter, Some("debug".to_string()));
}

#[test]
fn env_file_rejects_lines_without_separator() {
    let dir = mkdir();
    let path = dir.path().join(".env");
    fs::write(&path, "PLC_AUTOSTART\n").unwrap();
    assert!(parse_env_file(&path).is_err());
}

#[test]
fn env_file_accepts_values_containing_separator() {
    let dir = mkdir();
    let path = dir.path().join(".env");
    fs::write(&path, "PLC_LOG_FILTER=info,plcr_scan=debug\n").unwrap();
    let values = parse_env_file(&path).unwrap();
    assert_eq!(
        values.get("PLC_LOG_FILTER").map(String::as_str),
        Some("info,plcr_scan=debug")
    );
}

#[test]
fn state_dir_is_created_group_writable() {
    let dir = mkdir();
    let state = dir.path().join("state");
    init_state_dir(&state).unwrap();
    let mode = fs::metadata(&state).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o770);
}
