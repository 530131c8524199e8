//! Whole-runtime exercise: image tables, journal, scan cycle, plugin host
//! and the S7 server wired together the way `run` wires them, driven from a
//! real TCP client. A remote write must land in the image tables at the
//! next tick and be visible to a subsequent remote read.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use plcr_journal::Journal;
use plcr_plugin::{PluginDescriptor, PluginHost, PluginKind};
use plcr_s7_server::s7;
use plcr_scan::{ScanService, ScanState};

const PORT: u16 = 40103;

fn send_s7(stream: &mut TcpStream, message: &[u8]) {
    let mut payload = vec![2, 0xf0, 0x80];
    payload.extend_from_slice(message);
    let total = (payload.len() + 4) as u16;
    let mut frame = vec![3, 0];
    frame.extend_from_slice(&total.to_be_bytes());
    frame.extend_from_slice(&payload);
    stream.write_all(&frame).unwrap();
}

fn read_s7(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let total = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut body = vec![0u8; total - 4];
    stream.read_exact(&mut body).unwrap();
    assert_eq!(body[1], 0xf0, "expected a COTP data TPDU");
    body[3..].to_vec()
}

fn item(transport: u8, count: u16, db: u16, bit_address: u32) -> Vec<u8> {
    let mut item = vec![0x12, 0x0a, 0x10, transport];
    item.extend_from_slice(&count.to_be_bytes());
    item.extend_from_slice(&db.to_be_bytes());
    item.push(0x84);
    item.extend_from_slice(&bit_address.to_be_bytes()[1..4]);
    item
}

fn connect_with_retry(port: u16) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return stream,
            Err(err) if Instant::now() < deadline => {
                let _ = err;
                sleep(Duration::from_millis(50));
            }
            Err(err) => panic!("server never came up: {err}"),
        }
    }
}

#[test]
fn remote_write_lands_after_one_tick_and_reads_back() {
    plcr_image::init();
    Journal::global().init();

    // DB20 maps int_output from element 0; bind the element the test
    // writes so the journal apply has somewhere to land.
    let cell: &'static mut u16 = Box::leak(Box::new(0));
    unsafe {
        *plcr_image::base_pointers().int_output.add(1) = cell as *mut u16;
    }

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("s7.json");
    std::fs::write(
        &config_path,
        format!(
            r#"{{
                "server": {{ "bind_address": "127.0.0.1", "port": {PORT} }},
                "data_blocks": [
                    {{ "db_number": 20, "size_bytes": 16,
                       "mapping": {{ "type": "int_output", "start_buffer": 0 }} }}
                ],
                "logging": {{ "log_connections": false }}
            }}"#
        ),
    )
    .unwrap();

    let mut host = PluginHost::new();
    host.register_builtin(plcr_s7_server::PLUGIN_NAME, plcr_s7_server::vtable());
    host.load(PluginDescriptor {
        name: "s7".to_string(),
        path: plcr_s7_server::PLUGIN_NAME.to_string(),
        enabled: true,
        kind: PluginKind::Native,
        config_path: Some(PathBuf::from(&config_path)),
        env_path: None,
    })
    .unwrap();
    let host = Arc::new(host);

    // Autostart: the scan thread starts the plugins on its first
    // transition into RUNNING.
    let controller = ScanService::new(
        Some(plcr_program::blank()),
        None,
        Arc::clone(&host),
        true,
        None,
    )
    .start();

    let mut stream = connect_with_retry(PORT);
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    // COTP connect.
    let connect = [3u8, 0, 0, 11, 6, 0xe0, 0, 0, 0, 1, 0];
    stream.write_all(&connect).unwrap();
    let mut confirm = [0u8; 11];
    stream.read_exact(&mut confirm).unwrap();
    assert_eq!(confirm[5], 0xd0);

    // Remote write: bytes 00 FF at DB20 offset 2.
    let mut params = vec![s7::FUNC_WRITE_VAR, 1];
    params.extend_from_slice(&item(0x02, 2, 20, 2 * 8));
    let mut data = vec![0x00, s7::TRANSPORT_BYTES, 0x00, 16];
    data.extend_from_slice(&[0x00, 0xff]);
    send_s7(
        &mut stream,
        &s7::build(s7::ROSCTR_JOB, 1, s7::ERROR_NONE, &params, &data),
    );
    let reply = read_s7(&mut stream);
    let message = s7::parse(&reply).unwrap();
    assert_eq!(message.data, &[s7::RC_SUCCESS]);

    // One blank-program tick period is 50 ms; wait two to be safe, then
    // the journal entry must have landed in the bound cell.
    sleep(Duration::from_millis(120));
    assert_eq!(unsafe { *cell }, 0x00ff);
    assert_eq!(Journal::global().pending(), 0);

    // Remote read of the same two bytes sees the applied value.
    let mut params = vec![s7::FUNC_READ_VAR, 1];
    params.extend_from_slice(&item(0x02, 2, 20, 2 * 8));
    send_s7(
        &mut stream,
        &s7::build(s7::ROSCTR_JOB, 2, s7::ERROR_NONE, &params, &[]),
    );
    let reply = read_s7(&mut stream);
    let message = s7::parse(&reply).unwrap();
    assert_eq!(message.data[0], s7::RC_SUCCESS);
    assert_eq!(&message.data[4..6], &[0x00, 0xff]);

    let status = controller.status().unwrap();
    assert_eq!(status.state, ScanState::Running);
    assert!(status.tick_counter >= 1);

    drop(stream);
    controller.stop().unwrap();
    host.stop_all();
    host.cleanup_all();
}
