//! Null- and bounds-checked cell access through raw table base pointers.
//!
//! These helpers back both the in-process accessors of this crate and the
//! runtime-args helpers in `plcr-plugin-api`, so every consumer applies the
//! same unbound-slot and bounds rules.
//!
//! # Safety
//!
//! Callers must hold the image lock and pass base pointers obtained from
//! [`base_pointers`](crate::base_pointers) (or the same bundle forwarded
//! through runtime-args), with `len` equal to the family length.

use crate::types::BoolRow;
use crate::BOOL_BITS;

macro_rules! cell_accessors {
    ($read:ident, $write:ident, $ty:ty) => {
        pub unsafe fn $read(base: *const *mut $ty, len: usize, index: usize) -> Option<$ty> {
            if index >= len {
                return None;
            }
            let cell = *base.add(index);
            if cell.is_null() {
                None
            } else {
                Some(*cell)
            }
        }

        pub unsafe fn $write(base: *const *mut $ty, len: usize, index: usize, value: $ty) -> bool {
            if index >= len {
                return false;
            }
            let cell = *base.add(index);
            if cell.is_null() {
                false
            } else {
                *cell = value;
                true
            }
        }
    };
}

cell_accessors!(read_cell_u8, write_cell_u8, u8);
cell_accessors!(read_cell_u16, write_cell_u16, u16);
cell_accessors!(read_cell_u32, write_cell_u32, u32);
cell_accessors!(read_cell_u64, write_cell_u64, u64);

pub unsafe fn read_cell_bit(
    base: *const BoolRow,
    len: usize,
    index: usize,
    bit: usize,
) -> Option<bool> {
    if index >= len || bit >= BOOL_BITS {
        return None;
    }
    let cell = (*base.add(index))[bit];
    if cell.is_null() {
        None
    } else {
        Some(*cell != 0)
    }
}

pub unsafe fn write_cell_bit(
    base: *const BoolRow,
    len: usize,
    index: usize,
    bit: usize,
    value: bool,
) -> bool {
    if index >= len || bit >= BOOL_BITS {
        return false;
    }
    let cell = (*base.add(index))[bit];
    if cell.is_null() {
        false
    } else {
        *cell = value as u8;
        true
    }
}
