//! Runtime-args construction: the host-side shims behind the function
//! pointers plugins receive. The log shims funnel into the process logger
//! under the `plugin` target; the journal shims are thin status adapters
//! over the journal singleton, which does its own locking.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::Path;

use plcr_journal::Journal;
use plcr_logger::{debug_target, error_target, info_target, warn_target};
use plcr_plugin_api::{RuntimeArgs, CONFIG_PATH_MAX, STATUS_FAILED, STATUS_OK};

const LOG_TARGET: &str = "plugin";

fn message(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // Safety: the ABI requires a NUL-terminated string.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

extern "C-unwind" fn log_info(ptr: *const c_char) {
    if let Some(text) = message(ptr) {
        info_target!(LOG_TARGET, "{text}");
    }
}

extern "C-unwind" fn log_debug(ptr: *const c_char) {
    if let Some(text) = message(ptr) {
        debug_target!(LOG_TARGET, "{text}");
    }
}

extern "C-unwind" fn log_warn(ptr: *const c_char) {
    if let Some(text) = message(ptr) {
        warn_target!(LOG_TARGET, "{text}");
    }
}

extern "C-unwind" fn log_error(ptr: *const c_char) {
    if let Some(text) = message(ptr) {
        error_target!(LOG_TARGET, "{text}");
    }
}

extern "C-unwind" fn journal_write_bool(ty: u8, index: u16, bit: u8, value: u8) -> i32 {
    match Journal::global().write_bool(ty, index, bit, value != 0) {
        Ok(()) => STATUS_OK,
        Err(err) => {
            debug_target!(LOG_TARGET, "journal bool write refused: {err}");
            STATUS_FAILED
        }
    }
}

extern "C-unwind" fn journal_write_byte(ty: u8, index: u16, value: u8) -> i32 {
    match Journal::global().write_byte(ty, index, value) {
        Ok(()) => STATUS_OK,
        Err(err) => {
            debug_target!(LOG_TARGET, "journal byte write refused: {err}");
            STATUS_FAILED
        }
    }
}

extern "C-unwind" fn journal_write_int(ty: u8, index: u16, value: u16) -> i32 {
    match Journal::global().write_int(ty, index, value) {
        Ok(()) => STATUS_OK,
        Err(err) => {
            debug_target!(LOG_TARGET, "journal int write refused: {err}");
            STATUS_FAILED
        }
    }
}

extern "C-unwind" fn journal_write_dint(ty: u8, index: u16, value: u32) -> i32 {
    match Journal::global().write_dint(ty, index, value) {
        Ok(()) => STATUS_OK,
        Err(err) => {
            debug_target!(LOG_TARGET, "journal dint write refused: {err}");
            STATUS_FAILED
        }
    }
}

extern "C-unwind" fn journal_write_lint(ty: u8, index: u16, value: u64) -> i32 {
    match Journal::global().write_lint(ty, index, value) {
        Ok(()) => STATUS_OK,
        Err(err) => {
            debug_target!(LOG_TARGET, "journal lint write refused: {err}");
            STATUS_FAILED
        }
    }
}

/// Builds the runtime-args for one plugin instance. The returned value is
/// boxed by the caller and outlives the instance, so the pointer handed to
/// `init` stays valid even though plugins are told to copy it.
pub fn build_runtime_args(config_path: Option<&Path>) -> RuntimeArgs {
    let mut args = RuntimeArgs {
        buffers: plcr_image::base_pointers(),
        buffer_size: plcr_image::BUFFER_SIZE as u16,
        lock_image: plcr_image::image_lock_acquire,
        unlock_image: plcr_image::image_lock_release,
        log_info,
        log_debug,
        log_warn,
        log_error,
        write_bool: journal_write_bool,
        write_byte: journal_write_byte,
        write_int: journal_write_int,
        write_dint: journal_write_dint,
        write_lint: journal_write_lint,
        config_path: [0; CONFIG_PATH_MAX],
    };
    if let Some(path) = config_path {
        args.set_config_path(path);
    }
    args
}
