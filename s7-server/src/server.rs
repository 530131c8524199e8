//! The TCP server: listener, per-client sessions, request dispatch.
//!
//! Thread-per-client with blocking sockets and the configured timeouts; the
//! scan cycle never waits on any of this. Every remote read or write lands
//! in the single registered [`RwCallback`], which is where the plugin side
//! bridges to the image tables and the journal.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use parking_lot::Mutex;
use plcr_logger::{debug_target, info_target, warn_target};

use crate::area::AreaKind;
use crate::config::{Config, IdentityConfig, LoggingConfig, ServerConfig, PDU_MAX, PDU_MIN};
use crate::iso::{self, Cotp, FrameReader, Poll};
use crate::s7;
use crate::szl;
use crate::transcode::{RwError, RwOp};
use crate::LOG_TARGET;

/// The data callback the plugin registers as the backing of every area:
/// `(operation, area kind, area number, byte offset, bit, buffer)`. For
/// reads the buffer is filled; for writes it carries the incoming bytes.
pub type RwCallback =
    dyn Fn(RwOp, AreaKind, u16, usize, Option<u8>, &mut [u8]) -> Result<(), RwError> + Send + Sync;

/// Poll cadence for shutdown checks while a socket is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const ACCEPT_IDLE: Duration = Duration::from_millis(50);

pub struct S7Server {
    server: ServerConfig,
    identity: Arc<IdentityConfig>,
    logging: Arc<LoggingConfig>,
    callback: Arc<RwCallback>,
    shutdown: Arc<AtomicBool>,
    active_clients: Arc<AtomicUsize>,
    accept_thread: Option<thread::JoinHandle<()>>,
    client_threads: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
}

impl S7Server {
    pub fn new(config: &Config, callback: Arc<RwCallback>) -> S7Server {
        S7Server {
            server: config.server.clone(),
            identity: Arc::new(config.identity.clone()),
            logging: Arc::new(config.logging.clone()),
            callback,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_clients: Arc::new(AtomicUsize::new(0)),
            accept_thread: None,
            client_threads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn port(&self) -> u16 {
        self.server.port
    }

    /// Binds the listener and starts accepting. Fails only on bind.
    pub fn start(&mut self) -> io::Result<SocketAddr> {
        let address = format!("{}:{}", self.server.bind_address, self.server.port);
        let listener = TcpListener::bind(&address)?;
        let local = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        self.shutdown.store(false, Ordering::SeqCst);

        let shutdown = Arc::clone(&self.shutdown);
        let active = Arc::clone(&self.active_clients);
        let clients = Arc::clone(&self.client_threads);
        let callback = Arc::clone(&self.callback);
        let identity = Arc::clone(&self.identity);
        let logging = Arc::clone(&self.logging);
        let settings = self.server.clone();

        let handle = thread::Builder::new()
            .name("S7Accept".to_string())
            .spawn(move || {
                accept_loop(
                    listener, settings, identity, logging, callback, shutdown, active, clients,
                )
            })
            .expect("Start S7Accept thread failed");
        self.accept_thread = Some(handle);
        info_target!(LOG_TARGET, "listening on {local}");
        Ok(local)
    }

    /// Closes the listener and drains every client session.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        let handles: Vec<_> = self.client_threads.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        info_target!(LOG_TARGET, "server stopped");
    }
}

impl Drop for S7Server {
    fn drop(&mut self) {
        if self.accept_thread.is_some() {
            self.stop();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn accept_loop(
    listener: TcpListener,
    settings: ServerConfig,
    identity: Arc<IdentityConfig>,
    logging: Arc<LoggingConfig>,
    callback: Arc<RwCallback>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    clients: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
) {
    let mut client_id: u64 = 0;
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if active.load(Ordering::SeqCst) >= settings.max_clients as usize {
                    warn_target!(
                        LOG_TARGET,
                        "connection from {peer} refused: {} clients already connected",
                        settings.max_clients
                    );
                    continue;
                }
                if logging.log_connections {
                    info_target!(LOG_TARGET, "client {peer} connected");
                }
                client_id += 1;
                active.fetch_add(1, Ordering::SeqCst);
                let session = Session {
                    settings: settings.clone(),
                    identity: Arc::clone(&identity),
                    logging: Arc::clone(&logging),
                    callback: Arc::clone(&callback),
                    shutdown: Arc::clone(&shutdown),
                    negotiated_pdu: settings.pdu_size as u16,
                };
                let active_for_client = Arc::clone(&active);
                let handle = thread::Builder::new()
                    .name(format!("S7Client-{client_id}"))
                    .spawn(move || {
                        session.serve(stream, peer);
                        active_for_client.fetch_sub(1, Ordering::SeqCst);
                    })
                    .expect("Start S7Client thread failed");
                let mut guard = clients.lock();
                guard.retain(|h| !h.is_finished());
                guard.push(handle);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_IDLE);
            }
            Err(err) => {
                warn_target!(LOG_TARGET, "accept failed: {err}");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

struct Session {
    settings: ServerConfig,
    identity: Arc<IdentityConfig>,
    logging: Arc<LoggingConfig>,
    callback: Arc<RwCallback>,
    shutdown: Arc<AtomicBool>,
    negotiated_pdu: u16,
}

impl Session {
    fn serve(mut self, mut stream: TcpStream, peer: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let _ = stream.set_read_timeout(Some(POLL_INTERVAL));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(
            self.settings.send_timeout_ms.max(1),
        )));
        let recv_timeout = Duration::from_millis(self.settings.recv_timeout_ms.max(1));
        let ping_timeout = Duration::from_millis(self.settings.ping_timeout_ms.max(1));

        let mut reader = FrameReader::new();
        let mut idle = Duration::ZERO;
        let mut partial_since: Option<Instant> = None;

        while !self.shutdown.load(Ordering::SeqCst) {
            match reader.poll(&mut stream) {
                Ok(Poll::Frame(frame)) => {
                    idle = Duration::ZERO;
                    partial_since = None;
                    match self.handle_frame(&frame) {
                        Some(response) => {
                            if let Err(err) = iso::write_frame(&mut stream, &response) {
                                if self.logging.log_errors {
                                    warn_target!(LOG_TARGET, "{peer}: send failed: {err}");
                                }
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Ok(Poll::Pending) => {
                    if reader.has_partial() {
                        let since = *partial_since.get_or_insert_with(Instant::now);
                        if since.elapsed() >= recv_timeout {
                            if self.logging.log_errors {
                                warn_target!(LOG_TARGET, "{peer}: receive timeout mid-frame");
                            }
                            break;
                        }
                    } else {
                        partial_since = None;
                        idle += POLL_INTERVAL;
                        if idle >= ping_timeout {
                            if self.logging.log_connections {
                                info_target!(LOG_TARGET, "{peer}: idle past ping timeout");
                            }
                            break;
                        }
                    }
                }
                Ok(Poll::Closed) => break,
                Err(err) => {
                    if self.logging.log_errors {
                        warn_target!(LOG_TARGET, "{peer}: {err}");
                    }
                    break;
                }
            }
        }
        if self.logging.log_connections {
            info_target!(LOG_TARGET, "client {peer} disconnected");
        }
    }

    /// Handles one TPKT payload; `None` drops the connection.
    fn handle_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        match iso::parse_cotp(frame)? {
            Cotp::ConnectRequest { src_ref } => Some(iso::connect_confirm(src_ref)),
            Cotp::Data { payload } => {
                let response = self.handle_s7(payload)?;
                Some(iso::data_frame(&response))
            }
            Cotp::Other(pdu_type) => {
                if self.logging.log_errors {
                    warn_target!(LOG_TARGET, "unsupported COTP TPDU 0x{pdu_type:02x}");
                }
                None
            }
        }
    }

    fn handle_s7(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        let message = s7::parse(payload)?;
        match message.rosctr {
            s7::ROSCTR_JOB => {
                let function = *message.params.first()?;
                match function {
                    s7::FUNC_SETUP_COMMUNICATION => self.handle_setup(&message),
                    s7::FUNC_READ_VAR => self.handle_read(&message),
                    s7::FUNC_WRITE_VAR => self.handle_write(&message),
                    _ => {
                        if self.logging.log_errors {
                            warn_target!(LOG_TARGET, "unsupported S7 function 0x{function:02x}");
                        }
                        Some(s7::build(
                            s7::ROSCTR_ACK_DATA,
                            message.pdu_ref,
                            s7::ERROR_INVALID_FUNCTION,
                            &[function, 0],
                            &[],
                        ))
                    }
                }
            }
            s7::ROSCTR_USERDATA => self.handle_userdata(&message),
            _ => None,
        }
    }

    fn handle_setup(&mut self, message: &s7::S7Message) -> Option<Vec<u8>> {
        if message.params.len() < 8 {
            return None;
        }
        let requested = BigEndian::read_u16(&message.params[6..8]);
        let ceiling = self.settings.pdu_size.clamp(PDU_MIN, PDU_MAX) as u16;
        self.negotiated_pdu = requested.min(ceiling).max(PDU_MIN as u16);
        debug_target!(
            LOG_TARGET,
            "setup communication: negotiated pdu {}",
            self.negotiated_pdu
        );
        let mut params = [0u8; 8];
        params[0] = s7::FUNC_SETUP_COMMUNICATION;
        // Echo the caller's parallel-job limits.
        params[2..4].copy_from_slice(&message.params[2..4]);
        params[4..6].copy_from_slice(&message.params[4..6]);
        BigEndian::write_u16(&mut params[6..8], self.negotiated_pdu);
        Some(s7::build(
            s7::ROSCTR_ACK_DATA,
            message.pdu_ref,
            s7::ERROR_NONE,
            &params,
            &[],
        ))
    }

    fn handle_read(&mut self, message: &s7::S7Message) -> Option<Vec<u8>> {
        let items = s7::parse_items(message.params)?;
        // Leave headroom for headers and per-item framing.
        let budget = self.negotiated_pdu.saturating_sub(32) as usize;
        let mut data = s7::ReadResponseData::with_items(items.len());
        for item in &items {
            match self.read_item(item, budget) {
                Ok((bytes, bit)) => data.push_value(&bytes, bit),
                Err(err) => {
                    if self.logging.log_errors {
                        warn_target!(
                            LOG_TARGET,
                            "read of area 0x{:02x} db {} failed: {err:?}",
                            item.area_code,
                            item.db
                        );
                    }
                    data.push_error(err.return_code());
                }
            }
        }
        Some(s7::build(
            s7::ROSCTR_ACK_DATA,
            message.pdu_ref,
            s7::ERROR_NONE,
            &[s7::FUNC_READ_VAR, items.len() as u8],
            &data.finish(),
        ))
    }

    fn read_item(
        &self,
        item: &s7::ItemRequest,
        budget: usize,
    ) -> Result<(Vec<u8>, bool), RwError> {
        let kind = AreaKind::from_code(item.area_code).ok_or(RwError::ObjectMissing)?;
        let length = item.byte_len().ok_or(RwError::Unsupported)?;
        if length > budget {
            return Err(RwError::OutOfRange);
        }
        if self.logging.log_data_access {
            debug_target!(
                LOG_TARGET,
                "read {}{} offset {} len {length}",
                kind.label(),
                item.db,
                item.byte_offset()
            );
        }
        let mut buffer = vec![0u8; length];
        let bit = item.is_bit_access().then(|| item.bit());
        let callback = &*self.callback;
        callback(
            RwOp::Read,
            kind,
            item.db,
            item.byte_offset(),
            bit,
            &mut buffer,
        )?;
        Ok((buffer, bit.is_some()))
    }

    fn handle_write(&mut self, message: &s7::S7Message) -> Option<Vec<u8>> {
        let items = s7::parse_items(message.params)?;
        let values = s7::parse_write_values(message.data, items.len())?;
        let mut data = Vec::with_capacity(items.len());
        for (item, value) in items.iter().zip(values) {
            let result = self.write_item(item, &value);
            match result {
                Ok(()) => data.push(s7::RC_SUCCESS),
                Err(err) => {
                    if self.logging.log_errors {
                        warn_target!(
                            LOG_TARGET,
                            "write to area 0x{:02x} db {} failed: {err:?}",
                            item.area_code,
                            item.db
                        );
                    }
                    data.push(err.return_code());
                }
            }
        }
        Some(s7::build(
            s7::ROSCTR_ACK_DATA,
            message.pdu_ref,
            s7::ERROR_NONE,
            &[s7::FUNC_WRITE_VAR, items.len() as u8],
            &data,
        ))
    }

    fn write_item(&self, item: &s7::ItemRequest, value: &s7::WriteValue) -> Result<(), RwError> {
        let kind = AreaKind::from_code(item.area_code).ok_or(RwError::ObjectMissing)?;
        if self.logging.log_data_access {
            debug_target!(
                LOG_TARGET,
                "write {}{} offset {} len {}",
                kind.label(),
                item.db,
                item.byte_offset(),
                value.bytes.len()
            );
        }
        let mut bytes = value.bytes.to_vec();
        let bit = (item.is_bit_access() || value.transport == s7::TRANSPORT_BIT)
            .then(|| item.bit());
        let callback = &*self.callback;
        callback(
            RwOp::Write,
            kind,
            item.db,
            item.byte_offset(),
            bit,
            &mut bytes,
        )
    }

    fn handle_userdata(&mut self, message: &s7::S7Message) -> Option<Vec<u8>> {
        if message.params.len() < 8 || message.data.len() < 8 {
            return None;
        }
        let subfunction = message.params[6];
        let sequence = message.params[7];
        let szl_id = BigEndian::read_u16(&message.data[4..6]);
        let szl_index = BigEndian::read_u16(&message.data[6..8]);

        let mut params = vec![0x00, 0x01, 0x12, 0x08, 0x12, 0x84, subfunction, sequence];
        // Data-unit reference, last-data-unit flag, error code.
        params.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let data = match szl::build(szl_id, szl_index, &self.identity) {
            Some(payload) => {
                let mut data = vec![s7::RC_SUCCESS, s7::TRANSPORT_OCTETS, 0, 0];
                BigEndian::write_u16(&mut data[2..4], payload.len() as u16);
                data.extend_from_slice(&payload);
                data
            }
            None => {
                if self.logging.log_errors {
                    warn_target!(LOG_TARGET, "SZL 0x{szl_id:04x}.{szl_index} not served");
                }
                vec![RwError::ObjectMissing.return_code(), 0x00, 0x00, 0x00]
            }
        };
        Some(s7::build(
            s7::ROSCTR_USERDATA,
            message.pdu_ref,
            s7::ERROR_NONE,
            &params,
            &data,
        ))
    }
}
