//! PLCR plugin ABI.
//!
//! Everything a plugin is allowed to touch crosses this boundary: the
//! [`RuntimeArgs`] bundle it receives in `init`, and the entry-point
//! signatures the host resolves. The layout is C-compatible so a native
//! plugin written against the equivalent C header links unchanged; the
//! function pointers use the `C-unwind` ABI so a panic inside a built-in
//! (Rust) plugin unwinds into the host's failure boundary instead of
//! aborting the runtime.
//!
//! `RuntimeArgs` is handed to `init` by pointer and may be freed by the host
//! afterwards; a plugin keeps what it needs by copying the struct, which is
//! `Copy` for exactly that reason.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

use plcr_image::{raw, BufferPointers, BufferType};

#[cfg(test)]
mod tests;

/// Entry-point status: zero is success, anything else removes or degrades
/// the instance.
pub const STATUS_OK: i32 = 0;
/// Generic failure status for entry points.
pub const STATUS_FAILED: i32 = -1;

/// Capacity of the inline, NUL-terminated config path.
pub const CONFIG_PATH_MAX: usize = 512;

/// Symbol names resolved from native plugin modules.
pub const SYM_INIT: &[u8] = b"plugin_init\0";
pub const SYM_START: &[u8] = b"plugin_start\0";
pub const SYM_STOP: &[u8] = b"plugin_stop\0";
pub const SYM_CLEANUP: &[u8] = b"plugin_cleanup\0";
pub const SYM_CYCLE_START: &[u8] = b"plugin_cycle_start\0";
pub const SYM_CYCLE_END: &[u8] = b"plugin_cycle_end\0";

pub type PluginInitFn = unsafe extern "C-unwind" fn(*const RuntimeArgs) -> i32;
pub type PluginLifecycleFn = unsafe extern "C-unwind" fn() -> i32;
pub type PluginCycleFn = unsafe extern "C-unwind" fn();

pub type LockFn = extern "C" fn();
pub type LogFn = extern "C-unwind" fn(*const c_char);
pub type WriteBoolFn = extern "C-unwind" fn(u8, u16, u8, u8) -> i32;
pub type WriteByteFn = extern "C-unwind" fn(u8, u16, u8) -> i32;
pub type WriteIntFn = extern "C-unwind" fn(u8, u16, u16) -> i32;
pub type WriteDintFn = extern "C-unwind" fn(u8, u16, u32) -> i32;
pub type WriteLintFn = extern "C-unwind" fn(u8, u16, u64) -> i32;

/// The typed entry points of one plugin. The cycle hooks are optional: a
/// plugin opts in by exporting them (native) or filling the fields
/// (built-in); `None` means the scan cycle skips the instance.
#[derive(Clone, Copy)]
pub struct PluginVTable {
    pub init: PluginInitFn,
    pub start: PluginLifecycleFn,
    pub stop: PluginLifecycleFn,
    pub cleanup: PluginLifecycleFn,
    pub cycle_start: Option<PluginCycleFn>,
    pub cycle_end: Option<PluginCycleFn>,
}

/// The bundle handed to every plugin's `init`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RuntimeArgs {
    /// Base pointers of every image-table family.
    pub buffers: BufferPointers,
    /// Element count of every family.
    pub buffer_size: u16,
    /// Image lock pair; required around every read of the buffers.
    pub lock_image: LockFn,
    pub unlock_image: LockFn,
    /// Logging callbacks; messages are NUL-terminated UTF-8.
    pub log_info: LogFn,
    pub log_debug: LogFn,
    pub log_warn: LogFn,
    pub log_error: LogFn,
    /// Journal write callbacks, the only write path into the tables.
    pub write_bool: WriteBoolFn,
    pub write_byte: WriteByteFn,
    pub write_int: WriteIntFn,
    pub write_dint: WriteDintFn,
    pub write_lint: WriteLintFn,
    /// Per-instance configuration file, NUL-terminated; empty when the
    /// descriptor had none.
    pub config_path: [c_char; CONFIG_PATH_MAX],
}

// Safety: the pointer bundle addresses the process-lifetime table singleton
// and the function pointers are 'static; cell access is serialised by the
// image lock.
unsafe impl Send for RuntimeArgs {}
unsafe impl Sync for RuntimeArgs {}

impl RuntimeArgs {
    /// The configured per-instance file, if any.
    pub fn config_path(&self) -> Option<PathBuf> {
        // Safety: the host NUL-terminates the array.
        let cstr = unsafe { CStr::from_ptr(self.config_path.as_ptr()) };
        let path = cstr.to_string_lossy();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path.into_owned()))
        }
    }

    /// Host-side helper: stores `path` into the inline array, truncating to
    /// [`CONFIG_PATH_MAX`] minus the terminator.
    pub fn set_config_path(&mut self, path: &Path) {
        let bytes = path.as_os_str().as_encoded_bytes();
        let take = bytes.len().min(CONFIG_PATH_MAX - 1);
        for (slot, byte) in self.config_path.iter_mut().zip(&bytes[..take]) {
            *slot = *byte as c_char;
        }
        self.config_path[take] = 0;
    }

    /// Acquires the image lock; released when the token drops.
    pub fn acquire_image_lock(&self) -> ImageLockToken<'_> {
        (self.lock_image)();
        ImageLockToken {
            args: self,
            _not_send: PhantomData,
        }
    }

    fn log(&self, callback: LogFn, message: &str) {
        if let Ok(cstring) = CString::new(message) {
            callback(cstring.as_ptr());
        }
    }

    pub fn info(&self, message: &str) {
        self.log(self.log_info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(self.log_debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(self.log_warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(self.log_error, message);
    }

    /// Journal write helpers; `Err` carries the callback's status code.
    pub fn journal_write_bool(
        &self,
        ty: BufferType,
        index: u16,
        bit: u8,
        value: bool,
    ) -> Result<(), i32> {
        status((self.write_bool)(ty.code(), index, bit, value as u8))
    }

    pub fn journal_write_byte(&self, ty: BufferType, index: u16, value: u8) -> Result<(), i32> {
        status((self.write_byte)(ty.code(), index, value))
    }

    pub fn journal_write_int(&self, ty: BufferType, index: u16, value: u16) -> Result<(), i32> {
        status((self.write_int)(ty.code(), index, value))
    }

    pub fn journal_write_dint(&self, ty: BufferType, index: u16, value: u32) -> Result<(), i32> {
        status((self.write_dint)(ty.code(), index, value))
    }

    pub fn journal_write_lint(&self, ty: BufferType, index: u16, value: u64) -> Result<(), i32> {
        status((self.write_lint)(ty.code(), index, value))
    }
}

fn status(code: i32) -> Result<(), i32> {
    if code == STATUS_OK {
        Ok(())
    } else {
        Err(code)
    }
}

/// Proof that the plugin holds the image lock; all table reads go through
/// it. Not `Send`: the lock must be released on the acquiring thread.
pub struct ImageLockToken<'a> {
    args: &'a RuntimeArgs,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ImageLockToken<'_> {
    fn drop(&mut self) {
        (self.args.unlock_image)();
    }
}

impl ImageLockToken<'_> {
    fn len(&self) -> usize {
        self.args.buffer_size as usize
    }

    /// Reads a bool cell; `None` when unbound, out of range, or `ty` is not
    /// a bool family.
    pub fn read_bool(&self, ty: BufferType, index: usize, bit: usize) -> Option<bool> {
        let bufs = &self.args.buffers;
        let base = match ty {
            BufferType::BoolInput => bufs.bool_input,
            BufferType::BoolOutput => bufs.bool_output,
            BufferType::BoolMemory => bufs.bool_memory,
            _ => return None,
        };
        unsafe { raw::read_cell_bit(base, self.len(), index, bit) }
    }

    pub fn read_byte(&self, ty: BufferType, index: usize) -> Option<u8> {
        let bufs = &self.args.buffers;
        let base = match ty {
            BufferType::ByteInput => bufs.byte_input,
            BufferType::ByteOutput => bufs.byte_output,
            _ => return None,
        };
        unsafe { raw::read_cell_u8(base, self.len(), index) }
    }

    pub fn read_int(&self, ty: BufferType, index: usize) -> Option<u16> {
        let bufs = &self.args.buffers;
        let base = match ty {
            BufferType::IntInput => bufs.int_input,
            BufferType::IntOutput => bufs.int_output,
            BufferType::IntMemory => bufs.int_memory,
            _ => return None,
        };
        unsafe { raw::read_cell_u16(base, self.len(), index) }
    }

    pub fn read_dint(&self, ty: BufferType, index: usize) -> Option<u32> {
        let bufs = &self.args.buffers;
        let base = match ty {
            BufferType::DintInput => bufs.dint_input,
            BufferType::DintOutput => bufs.dint_output,
            BufferType::DintMemory => bufs.dint_memory,
            _ => return None,
        };
        unsafe { raw::read_cell_u32(base, self.len(), index) }
    }

    pub fn read_lint(&self, ty: BufferType, index: usize) -> Option<u64> {
        let bufs = &self.args.buffers;
        let base = match ty {
            BufferType::LintInput => bufs.lint_input,
            BufferType::LintOutput => bufs.lint_output,
            BufferType::LintMemory => bufs.lint_memory,
            _ => return None,
        };
        unsafe { raw::read_cell_u64(base, self.len(), index) }
    }
}
