//! PLCR image tables.
//!
//! The shared I/O surface between the control program, the scan cycle and
//! every plugin: fourteen fixed-length arrays of optional pointers into the
//! control program's variable storage. The control program publishes its
//! bindings once during initialization; afterwards the pointers are constant
//! and only the pointed-to cells change.
//!
//! All cell reads and writes are serialised by the process-wide image lock.
//! Operations with a lock-held precondition take a [`ImageGuard`] reference,
//! so holding the lock is visible in the type signature; the raw
//! acquire/release pair ([`image_lock_acquire`], [`image_lock_release`]) is
//! what crosses the plugin ABI.

mod tables;
mod types;

pub mod raw;

pub use tables::{
    base_pointers, image_lock_acquire, image_lock_release, init, lock, read_bool, read_byte,
    read_dint, read_int, read_lint, store_masked, unbind_all, write_bool, write_byte, write_dint,
    write_int, write_lint, ImageGuard,
};
pub use types::{BoolRow, BufferPointers, BufferType, ElementWidth};

/// Element count of every image-table family.
pub const BUFFER_SIZE: usize = 1024;

/// Bit slots per bool-family element.
pub const BOOL_BITS: usize = 8;

/// Number of buffer-type codes.
pub const BUFFER_TYPE_COUNT: usize = 14;

/// `bit_index` value for non-bool journal entries and callbacks.
pub const BIT_NONE: u8 = 0xff;
