use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::thread::sleep;
use std::time::Duration;

use plcr_logger_service::Config;

// Lets the writer thread pick up the pending client connection.
const ACCEPT_GRACE: Duration = Duration::from_millis(500);

#[test]
fn records_reach_socket_clients_and_keep_the_line_format() {
    let dir = tempfile::Builder::new()
        .prefix("plcr_log_test")
        .tempdir()
        .unwrap();
    let socket_path = dir.path().join("log.sock");

    let config = Config {
        filter: Some("info".to_string()),
        log_to_stdout: false,
        color: false,
        socket_path: Some(socket_path.clone()),
    };
    let guard = plcr_logger_service::init(None, config).unwrap();

    let client = UnixStream::connect(&socket_path).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    sleep(ACCEPT_GRACE);

    plcr_logger::info!("first shipped line");
    plcr_logger::warn_target!("component", "second shipped line");
    // Filtered below the configured level; must not reach the client.
    plcr_logger::debug!("never shipped");
    plcr_logger::error!("third shipped line");

    let mut reader = BufReader::new(client);
    let mut lines = Vec::new();
    for _ in 0..3 {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        lines.push(line.trim_end().to_string());
    }

    assert!(lines[0].contains(" INFO "));
    assert!(lines[0].ends_with("first shipped line"));
    assert!(lines[1].contains(" WARN [component]"));
    assert!(lines[2].contains(" ERROR "));

    // Timestamp prefix: `YYYY-MM-DD hh:mm:ss.mmm +00:00`.
    let ts = &lines[0][..30];
    assert_eq!(&ts[4..5], "-");
    assert_eq!(&ts[10..11], " ");
    assert!(ts.ends_with("+00:00"));

    drop(guard);
}
