//! Full-stack exercise: a TCP client speaking ISO-on-TCP against a running
//! server instance, image tables on one side, journal recorder on the other.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use plcr_s7_server::area::AreaTable;
use plcr_s7_server::config::Config;
use plcr_s7_server::server::S7Server;
use plcr_s7_server::{area_callback, s7};

const CONFIG_JSON: &str = r#"{
    "server": {
        "bind_address": "127.0.0.1",
        "port": 40102,
        "pdu_size": 480
    },
    "identity": { "as_name": "ROUNDTRIP-STATION" },
    "data_blocks": [
        { "db_number": 10, "size_bytes": 8,
          "mapping": { "type": "int_input", "start_buffer": 0 } },
        { "db_number": 20, "size_bytes": 16,
          "mapping": { "type": "int_output", "start_buffer": 0 } }
    ],
    "logging": { "log_connections": false, "log_errors": true }
}"#;

fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    assert_eq!(header[0], 3, "TPKT version");
    let total = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut body = vec![0u8; total - 4];
    stream.read_exact(&mut body).unwrap();
    body
}

fn send_frame(stream: &mut TcpStream, payload: &[u8]) {
    let total = (payload.len() + 4) as u16;
    let mut frame = vec![3, 0];
    frame.extend_from_slice(&total.to_be_bytes());
    frame.extend_from_slice(payload);
    stream.write_all(&frame).unwrap();
}

fn send_s7(stream: &mut TcpStream, message: &[u8]) {
    let mut payload = vec![2, 0xf0, 0x80];
    payload.extend_from_slice(message);
    send_frame(stream, &payload);
}

/// Strips the COTP data header off a received payload.
fn s7_part(payload: &[u8]) -> &[u8] {
    assert_eq!(payload[1], 0xf0, "expected a COTP data TPDU");
    &payload[3..]
}

fn read_item(transport: u8, count: u16, db: u16, area: u8, bit_address: u32) -> Vec<u8> {
    let mut item = vec![0x12, 0x0a, 0x10, transport];
    item.extend_from_slice(&count.to_be_bytes());
    item.extend_from_slice(&db.to_be_bytes());
    item.push(area);
    item.extend_from_slice(&bit_address.to_be_bytes()[1..4]);
    item
}

#[test]
fn client_session_reads_writes_and_queries_identity() {
    plcr_image::init();
    common::bind_int_input(0, 0x1234);
    common::bind_int_input(1, 0x5678);
    common::take_writes();

    let config: Config = serde_json::from_str(CONFIG_JSON).unwrap();
    let config = config.sanitize();
    let areas = Arc::new(AreaTable::from_config(&config));
    let callback = area_callback(areas, common::test_args());
    let mut server = S7Server::new(&config, callback);
    let local = server.start().expect("bind 127.0.0.1:40102");

    let mut stream = TcpStream::connect(local).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    // COTP connect: expect a connection confirm echoing our reference.
    send_frame(
        &mut stream,
        &[6, 0xe0, 0x00, 0x00, 0x43, 0x21, 0x00],
    );
    let confirm = read_frame(&mut stream);
    assert_eq!(confirm[1], 0xd0);
    assert_eq!(&confirm[4..6], &[0x43, 0x21]);

    // Setup communication: the server clamps our 960 wish to its 480.
    let mut setup = vec![s7::FUNC_SETUP_COMMUNICATION, 0x00];
    setup.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    setup.extend_from_slice(&960u16.to_be_bytes());
    send_s7(
        &mut stream,
        &s7::build(s7::ROSCTR_JOB, 1, s7::ERROR_NONE, &setup, &[]),
    );
    let reply = read_frame(&mut stream);
    let message = s7::parse(s7_part(&reply)).unwrap();
    assert_eq!(message.rosctr, s7::ROSCTR_ACK_DATA);
    assert_eq!(&message.params[6..8], &480u16.to_be_bytes());

    // Read 4 bytes of DB10: the two bound input words, big-endian.
    let mut params = vec![s7::FUNC_READ_VAR, 1];
    params.extend_from_slice(&read_item(0x02, 4, 10, 0x84, 0));
    send_s7(
        &mut stream,
        &s7::build(s7::ROSCTR_JOB, 2, s7::ERROR_NONE, &params, &[]),
    );
    let reply = read_frame(&mut stream);
    let message = s7::parse(s7_part(&reply)).unwrap();
    assert_eq!(message.pdu_ref, 2);
    assert_eq!(message.data[0], s7::RC_SUCCESS);
    assert_eq!(&message.data[4..8], &[0x12, 0x34, 0x56, 0x78]);

    // Write bytes 00 FF at DB20 offset 2: lands as one journal write to
    // int_output element 1.
    let mut params = vec![s7::FUNC_WRITE_VAR, 1];
    params.extend_from_slice(&read_item(0x02, 2, 20, 0x84, 2 * 8));
    let mut data = vec![0x00, s7::TRANSPORT_BYTES];
    data.extend_from_slice(&16u16.to_be_bytes());
    data.extend_from_slice(&[0x00, 0xff]);
    send_s7(
        &mut stream,
        &s7::build(s7::ROSCTR_JOB, 3, s7::ERROR_NONE, &params, &data),
    );
    let reply = read_frame(&mut stream);
    let message = s7::parse(s7_part(&reply)).unwrap();
    assert_eq!(message.data, &[s7::RC_SUCCESS]);
    assert_eq!(common::take_writes(), vec![(6, 1, 0xff, 0x00ff)]);

    // Reading an undeclared DB fails with object-not-found, connection
    // stays up.
    let mut params = vec![s7::FUNC_READ_VAR, 1];
    params.extend_from_slice(&read_item(0x02, 2, 99, 0x84, 0));
    send_s7(
        &mut stream,
        &s7::build(s7::ROSCTR_JOB, 4, s7::ERROR_NONE, &params, &[]),
    );
    let reply = read_frame(&mut stream);
    let message = s7::parse(s7_part(&reply)).unwrap();
    assert_eq!(message.data[0], 0x0a);

    // SZL component identification carries the configured station name.
    let params = [0x00, 0x01, 0x12, 0x04, 0x11, 0x44, 0x01, 0x00];
    let mut data = vec![0xff, 0x09, 0x00, 0x04];
    data.extend_from_slice(&0x001cu16.to_be_bytes());
    data.extend_from_slice(&0u16.to_be_bytes());
    send_s7(
        &mut stream,
        &s7::build(s7::ROSCTR_USERDATA, 5, s7::ERROR_NONE, &params, &data),
    );
    let reply = read_frame(&mut stream);
    let message = s7::parse(s7_part(&reply)).unwrap();
    assert_eq!(message.rosctr, s7::ROSCTR_USERDATA);
    let haystack = message.data.to_vec();
    let needle = b"ROUNDTRIP-STATION";
    assert!(
        haystack.windows(needle.len()).any(|w| w == needle),
        "identity string missing from SZL response"
    );

    drop(stream);
    server.stop();
}
