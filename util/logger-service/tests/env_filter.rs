use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::thread::sleep;
use std::time::Duration;

use plcr_logger_service::Config;

const FILTER_ENV: &str = "PLCR_LOG_TEST_FILTER";

#[test]
fn environment_variable_overrides_config_filter() {
    std::env::set_var(FILTER_ENV, "warn");

    let dir = tempfile::Builder::new()
        .prefix("plcr_log_env")
        .tempdir()
        .unwrap();
    let socket_path = dir.path().join("log.sock");

    // The config asks for trace, the environment narrows it to warn.
    let config = Config {
        filter: Some("trace".to_string()),
        log_to_stdout: false,
        color: false,
        socket_path: Some(socket_path.clone()),
    };
    let guard = plcr_logger_service::init(Some(FILTER_ENV), config).unwrap();

    let client = UnixStream::connect(&socket_path).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    sleep(Duration::from_millis(500));

    plcr_logger::info!("suppressed by env filter");
    plcr_logger::warn!("passes the env filter");

    let mut reader = BufReader::new(client);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert!(line.contains(" WARN "));
    assert!(line.trim_end().ends_with("passes the env filter"));

    drop(guard);
}
