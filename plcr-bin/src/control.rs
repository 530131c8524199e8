//! The command socket: a line-oriented protocol on a UNIX domain socket,
//! used by the management front end. One command per line (`start`,
//! `stop`, `status`, `reload`), answered with `0[ info]` on success or
//! `1 diagnostic` on failure. Every command is serialised onto the scan
//! engine's state machine through its controller channel.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use plcr_channel::Receiver;
use plcr_logger::{debug, warn};
use plcr_scan::ScanController;
use plcr_stop_handler::{new_crossbeam_exit_rx, register_thread};

const ACCEPT_IDLE: Duration = Duration::from_millis(100);
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Binds the control socket and spawns the `ControlSocket` service thread.
pub fn start(path: &Path, controller: ScanController) -> io::Result<()> {
    // A previous run may have left the socket file behind.
    let _ = fs::remove_file(path);
    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    let stop_rx = new_crossbeam_exit_rx();
    let thread = thread::Builder::new()
        .name("ControlSocket".to_string())
        .spawn(move || accept_loop(listener, controller, stop_rx))
        .expect("Start ControlSocket thread failed");
    register_thread("ControlSocket", thread);
    Ok(())
}

fn accept_loop(listener: UnixListener, controller: ScanController, stop_rx: Receiver<()>) {
    loop {
        if stop_rx.try_recv().is_ok() {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = serve_connection(stream, &controller) {
                    debug!("control connection ended: {err}");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_IDLE);
            }
            Err(err) => {
                warn!("control socket accept failed: {err}");
                thread::sleep(ACCEPT_IDLE);
            }
        }
    }
}

fn serve_connection(stream: UnixStream, controller: &ScanController) -> io::Result<()> {
    stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        let reply = dispatch(command, controller);
        writer.write_all(reply.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub(crate) fn dispatch(command: &str, controller: &ScanController) -> String {
    match command {
        "start" => match controller.start() {
            Ok(()) => String::from("0"),
            Err(err) => format!("1 {err}"),
        },
        "stop" => match controller.stop() {
            Ok(()) => String::from("0"),
            Err(err) => format!("1 {err}"),
        },
        "reload" => match controller.reload() {
            Ok(()) => String::from("0"),
            Err(err) => format!("1 {err}"),
        },
        "status" => match controller.status() {
            Ok(status) => format!(
                "0 {} ticks={} overruns={} scan_mean_us={} scan_max_us={} latency_mean_us={}",
                status.state,
                status.tick_counter,
                status.timing.overruns,
                status.timing.scan.mean().as_micros(),
                status.timing.scan.max().as_micros(),
                status.timing.latency.mean().as_micros(),
            ),
            Err(err) => format!("1 {err}"),
        },
        other => format!("1 unknown command `{other}`"),
    }
}
