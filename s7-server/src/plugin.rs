//! Plugin entry points and instance state machine:
//! `UNINITIALISED → INITIALISED → RUNNING ↔ STOPPED → CLEANED`.
//!
//! The host hands `init` a runtime-args pointer it may free afterwards, so
//! the first thing `init` does is copy the struct. Entry points carry no
//! instance argument, which is why the instance state is a module-level
//! singleton behind a mutex, exactly like a C plugin would keep it.

use std::sync::Arc;

use parking_lot::Mutex;
use plcr_logger::{error_target, info_target};
use plcr_plugin_api::{PluginVTable, RuntimeArgs, STATUS_FAILED, STATUS_OK};

use crate::area::{AreaKind, AreaTable};
use crate::config::Config;
use crate::server::{RwCallback, S7Server};
use crate::transcode::{self, RwError, RwOp};
use crate::LOG_TARGET;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Uninitialised,
    Initialised,
    Running,
    Stopped,
    Cleaned,
}

struct PluginState {
    phase: Phase,
    server: Option<S7Server>,
    enabled: bool,
}

static STATE: Mutex<PluginState> = Mutex::new(PluginState {
    phase: Phase::Uninitialised,
    server: None,
    enabled: true,
});

/// Bridges the server's data callback onto the area table: reads snapshot
/// the image tables under the lock, writes fan out into the journal.
pub fn area_callback(areas: Arc<AreaTable>, args: RuntimeArgs) -> Arc<RwCallback> {
    Arc::new(move |op, kind: AreaKind, number, offset, bit, buffer: &mut [u8]| {
        let area = areas.find(kind, number).ok_or(RwError::ObjectMissing)?;
        match (op, bit) {
            (RwOp::Read, None) => transcode::read_area(&args, area, offset, buffer),
            (RwOp::Read, Some(bit)) => {
                let value = transcode::read_bit(&args, area, offset, bit)?;
                buffer[0] = value as u8;
                Ok(())
            }
            (RwOp::Write, None) => transcode::write_area(&args, area, offset, buffer),
            (RwOp::Write, Some(bit)) => {
                let value = buffer.first().copied().unwrap_or(0) != 0;
                transcode::write_bit(&args, area, offset, bit, value)
            }
        }
    })
}

unsafe extern "C-unwind" fn s7_init(args: *const RuntimeArgs) -> i32 {
    if args.is_null() {
        return STATUS_FAILED;
    }
    // The host may free its transport copy after init returns.
    let args = *args;

    let config = Config::load(args.config_path().as_deref());
    let enabled = config.server.enabled;
    let areas = Arc::new(AreaTable::from_config(&config));
    let callback = area_callback(Arc::clone(&areas), args);
    let server = S7Server::new(&config, callback);

    let mut state = STATE.lock();
    if !matches!(state.phase, Phase::Uninitialised | Phase::Cleaned) {
        error_target!(LOG_TARGET, "init called twice");
        return STATUS_FAILED;
    }
    info_target!(
        LOG_TARGET,
        "initialised with {} data area(s), port {}",
        areas.len(),
        server.port()
    );
    state.server = Some(server);
    state.enabled = enabled;
    state.phase = Phase::Initialised;
    STATUS_OK
}

unsafe extern "C-unwind" fn s7_start() -> i32 {
    let mut state = STATE.lock();
    if !matches!(state.phase, Phase::Initialised | Phase::Stopped) {
        return STATUS_FAILED;
    }
    if !state.enabled {
        info_target!(LOG_TARGET, "disabled by configuration, not binding");
        return STATUS_OK;
    }
    let server = state.server.as_mut().expect("initialised implies a server");
    match server.start() {
        Ok(_) => {
            state.phase = Phase::Running;
            STATUS_OK
        }
        Err(err) => {
            let port = server.port();
            if port < 1024 {
                error_target!(
                    LOG_TARGET,
                    "binding port {port} failed: {err}; ports below 1024 need elevated \
                     privileges (CAP_NET_BIND_SERVICE or root)"
                );
            } else {
                error_target!(LOG_TARGET, "binding port {port} failed: {err}");
            }
            // The instance stays INITIALISED; a later start may succeed.
            STATUS_OK
        }
    }
}

unsafe extern "C-unwind" fn s7_stop() -> i32 {
    let mut state = STATE.lock();
    if state.phase == Phase::Running {
        if let Some(server) = state.server.as_mut() {
            server.stop();
        }
        state.phase = Phase::Stopped;
    }
    STATUS_OK
}

unsafe extern "C-unwind" fn s7_cleanup() -> i32 {
    let mut state = STATE.lock();
    state.server = None;
    state.phase = Phase::Cleaned;
    STATUS_OK
}

/// The vtable the host binds when a descriptor names the `s7-server`
/// builtin. No cycle hooks: the server reads on demand under the image
/// lock and writes through the journal, so it has no per-tick work.
pub fn vtable() -> PluginVTable {
    PluginVTable {
        init: s7_init,
        start: s7_start,
        stop: s7_stop,
        cleanup: s7_cleanup,
        cycle_start: None,
        cycle_end: None,
    }
}
