use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr;

use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;

use crate::raw;
use crate::types::{BoolRow, BufferPointers, BufferType};
use crate::{BOOL_BITS, BUFFER_SIZE};

struct Tables {
    bool_input: [BoolRow; BUFFER_SIZE],
    bool_output: [BoolRow; BUFFER_SIZE],
    bool_memory: [BoolRow; BUFFER_SIZE],
    byte_input: [*mut u8; BUFFER_SIZE],
    byte_output: [*mut u8; BUFFER_SIZE],
    int_input: [*mut u16; BUFFER_SIZE],
    int_output: [*mut u16; BUFFER_SIZE],
    int_memory: [*mut u16; BUFFER_SIZE],
    dint_input: [*mut u32; BUFFER_SIZE],
    dint_output: [*mut u32; BUFFER_SIZE],
    dint_memory: [*mut u32; BUFFER_SIZE],
    lint_input: [*mut u64; BUFFER_SIZE],
    lint_output: [*mut u64; BUFFER_SIZE],
    lint_memory: [*mut u64; BUFFER_SIZE],
}

impl Tables {
    const UNBOUND: Tables = Tables {
        bool_input: [[ptr::null_mut(); BOOL_BITS]; BUFFER_SIZE],
        bool_output: [[ptr::null_mut(); BOOL_BITS]; BUFFER_SIZE],
        bool_memory: [[ptr::null_mut(); BOOL_BITS]; BUFFER_SIZE],
        byte_input: [ptr::null_mut(); BUFFER_SIZE],
        byte_output: [ptr::null_mut(); BUFFER_SIZE],
        int_input: [ptr::null_mut(); BUFFER_SIZE],
        int_output: [ptr::null_mut(); BUFFER_SIZE],
        int_memory: [ptr::null_mut(); BUFFER_SIZE],
        dint_input: [ptr::null_mut(); BUFFER_SIZE],
        dint_output: [ptr::null_mut(); BUFFER_SIZE],
        dint_memory: [ptr::null_mut(); BUFFER_SIZE],
        lint_input: [ptr::null_mut(); BUFFER_SIZE],
        lint_output: [ptr::null_mut(); BUFFER_SIZE],
        lint_memory: [ptr::null_mut(); BUFFER_SIZE],
    };
}

struct Store {
    tables: UnsafeCell<Tables>,
}

// Safety: binding slots are written during single-threaded startup (and
// under the lock on reload); cell access is serialised by IMAGE_LOCK.
unsafe impl Sync for Store {}

static STORE: Store = Store {
    tables: UnsafeCell::new(Tables::UNBOUND),
};

static IMAGE_LOCK: RawMutex = RawMutex::INIT;

/// Proof that the image lock is held. Obtained from [`lock`]; released on
/// drop. Not `Send`: the lock must be released on the acquiring thread.
pub struct ImageGuard {
    _not_send: PhantomData<*const ()>,
}

/// Acquires the image lock.
pub fn lock() -> ImageGuard {
    IMAGE_LOCK.lock();
    ImageGuard {
        _not_send: PhantomData,
    }
}

impl Drop for ImageGuard {
    fn drop(&mut self) {
        // Safety: constructing an ImageGuard acquired the lock.
        unsafe { IMAGE_LOCK.unlock() }
    }
}

/// ABI shim: acquires the image lock. Pair every call with
/// [`image_lock_release`] on the same thread.
pub extern "C" fn image_lock_acquire() {
    IMAGE_LOCK.lock();
}

/// ABI shim: releases the image lock acquired via [`image_lock_acquire`].
pub extern "C" fn image_lock_release() {
    // Safety: the ABI contract requires a matching acquire on this thread.
    unsafe { IMAGE_LOCK.unlock() }
}

/// Resets every slot to unbound. Called once before any worker thread
/// exists, and again under the lock when a program is reloaded.
pub fn init() {
    let guard = lock();
    unbind_all(&guard);
}

/// Unbinds every slot. The storage the slots pointed at stays with the
/// control program that owns it.
pub fn unbind_all(_guard: &ImageGuard) {
    unsafe {
        *STORE.tables.get() = Tables::UNBOUND;
    }
}

/// The base-pointer bundle pushed into the control program and forwarded to
/// plugins. The addresses are stable for the process lifetime.
pub fn base_pointers() -> BufferPointers {
    let tables = STORE.tables.get();
    unsafe {
        BufferPointers {
            bool_input: (*tables).bool_input.as_mut_ptr(),
            bool_output: (*tables).bool_output.as_mut_ptr(),
            bool_memory: (*tables).bool_memory.as_mut_ptr(),
            byte_input: (*tables).byte_input.as_mut_ptr(),
            byte_output: (*tables).byte_output.as_mut_ptr(),
            int_input: (*tables).int_input.as_mut_ptr(),
            int_output: (*tables).int_output.as_mut_ptr(),
            int_memory: (*tables).int_memory.as_mut_ptr(),
            dint_input: (*tables).dint_input.as_mut_ptr(),
            dint_output: (*tables).dint_output.as_mut_ptr(),
            dint_memory: (*tables).dint_memory.as_mut_ptr(),
            lint_input: (*tables).lint_input.as_mut_ptr(),
            lint_output: (*tables).lint_output.as_mut_ptr(),
            lint_memory: (*tables).lint_memory.as_mut_ptr(),
            buffer_size: BUFFER_SIZE as u16,
        }
    }
}

fn bool_base(ty: BufferType) -> *const BoolRow {
    let bufs = base_pointers();
    match ty {
        BufferType::BoolInput => bufs.bool_input,
        BufferType::BoolOutput => bufs.bool_output,
        BufferType::BoolMemory => bufs.bool_memory,
        _ => unreachable!("not a bool family: {ty:?}"),
    }
}

fn byte_base(ty: BufferType) -> *const *mut u8 {
    let bufs = base_pointers();
    match ty {
        BufferType::ByteInput => bufs.byte_input,
        BufferType::ByteOutput => bufs.byte_output,
        _ => unreachable!("not a byte family: {ty:?}"),
    }
}

fn int_base(ty: BufferType) -> *const *mut u16 {
    let bufs = base_pointers();
    match ty {
        BufferType::IntInput => bufs.int_input,
        BufferType::IntOutput => bufs.int_output,
        BufferType::IntMemory => bufs.int_memory,
        _ => unreachable!("not an int family: {ty:?}"),
    }
}

fn dint_base(ty: BufferType) -> *const *mut u32 {
    let bufs = base_pointers();
    match ty {
        BufferType::DintInput => bufs.dint_input,
        BufferType::DintOutput => bufs.dint_output,
        BufferType::DintMemory => bufs.dint_memory,
        _ => unreachable!("not a dint family: {ty:?}"),
    }
}

fn lint_base(ty: BufferType) -> *const *mut u64 {
    let bufs = base_pointers();
    match ty {
        BufferType::LintInput => bufs.lint_input,
        BufferType::LintOutput => bufs.lint_output,
        BufferType::LintMemory => bufs.lint_memory,
        _ => unreachable!("not a lint family: {ty:?}"),
    }
}

/// Reads a bool cell; `None` when the slot is unbound or out of range.
pub fn read_bool(_guard: &ImageGuard, ty: BufferType, index: usize, bit: usize) -> Option<bool> {
    if !ty.is_bool() {
        return None;
    }
    unsafe { raw::read_cell_bit(bool_base(ty), BUFFER_SIZE, index, bit) }
}

/// Writes a bool cell; `false` when the slot is unbound or out of range.
pub fn write_bool(
    _guard: &ImageGuard,
    ty: BufferType,
    index: usize,
    bit: usize,
    value: bool,
) -> bool {
    if !ty.is_bool() {
        return false;
    }
    unsafe { raw::write_cell_bit(bool_base(ty), BUFFER_SIZE, index, bit, value) }
}

pub fn read_byte(_guard: &ImageGuard, ty: BufferType, index: usize) -> Option<u8> {
    match ty {
        BufferType::ByteInput | BufferType::ByteOutput => {
            unsafe { raw::read_cell_u8(byte_base(ty), BUFFER_SIZE, index) }
        }
        _ => None,
    }
}

pub fn write_byte(_guard: &ImageGuard, ty: BufferType, index: usize, value: u8) -> bool {
    match ty {
        BufferType::ByteInput | BufferType::ByteOutput => {
            unsafe { raw::write_cell_u8(byte_base(ty), BUFFER_SIZE, index, value) }
        }
        _ => false,
    }
}

pub fn read_int(_guard: &ImageGuard, ty: BufferType, index: usize) -> Option<u16> {
    match ty {
        BufferType::IntInput | BufferType::IntOutput | BufferType::IntMemory => {
            unsafe { raw::read_cell_u16(int_base(ty), BUFFER_SIZE, index) }
        }
        _ => None,
    }
}

pub fn write_int(_guard: &ImageGuard, ty: BufferType, index: usize, value: u16) -> bool {
    match ty {
        BufferType::IntInput | BufferType::IntOutput | BufferType::IntMemory => {
            unsafe { raw::write_cell_u16(int_base(ty), BUFFER_SIZE, index, value) }
        }
        _ => false,
    }
}

pub fn read_dint(_guard: &ImageGuard, ty: BufferType, index: usize) -> Option<u32> {
    match ty {
        BufferType::DintInput | BufferType::DintOutput | BufferType::DintMemory => {
            unsafe { raw::read_cell_u32(dint_base(ty), BUFFER_SIZE, index) }
        }
        _ => None,
    }
}

pub fn write_dint(_guard: &ImageGuard, ty: BufferType, index: usize, value: u32) -> bool {
    match ty {
        BufferType::DintInput | BufferType::DintOutput | BufferType::DintMemory => {
            unsafe { raw::write_cell_u32(dint_base(ty), BUFFER_SIZE, index, value) }
        }
        _ => false,
    }
}

pub fn read_lint(_guard: &ImageGuard, ty: BufferType, index: usize) -> Option<u64> {
    match ty {
        BufferType::LintInput | BufferType::LintOutput | BufferType::LintMemory => {
            unsafe { raw::read_cell_u64(lint_base(ty), BUFFER_SIZE, index) }
        }
        _ => None,
    }
}

pub fn write_lint(_guard: &ImageGuard, ty: BufferType, index: usize, value: u64) -> bool {
    match ty {
        BufferType::LintInput | BufferType::LintOutput | BufferType::LintMemory => {
            unsafe { raw::write_cell_u64(lint_base(ty), BUFFER_SIZE, index, value) }
        }
        _ => false,
    }
}

/// Stores a 64-bit value into `(ty, index[, bit])`, masked to the family's
/// element width. Returns `false` when the slot is unbound or out of range.
/// This is the journal's apply primitive.
pub fn store_masked(
    guard: &ImageGuard,
    ty: BufferType,
    index: usize,
    bit: u8,
    value: u64,
) -> bool {
    let value = value & ty.value_mask();
    match ty.width() {
        crate::ElementWidth::Bit => write_bool(guard, ty, index, bit as usize, value != 0),
        crate::ElementWidth::Byte => write_byte(guard, ty, index, value as u8),
        crate::ElementWidth::Word => write_int(guard, ty, index, value as u16),
        crate::ElementWidth::DoubleWord => write_dint(guard, ty, index, value as u32),
        crate::ElementWidth::QuadWord => write_lint(guard, ty, index, value),
    }
}
