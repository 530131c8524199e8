//! The data path between wire bytes and image-table cells.
//!
//! Reads take the image lock once, transcode the covering elements into the
//! area's staging buffer (big-endian for the 16/32/64-bit families, packed
//! bits in little-endian bit order for the bool families), and copy the
//! requested slice out, so every request gets a consistent snapshot. Writes never
//! take the lock: the slice is split into per-cell journal writes and the
//! sequence numbers assigned on insertion preserve the frame's order.

use byteorder::{BigEndian, ByteOrder};
use plcr_image::ElementWidth;
use plcr_plugin_api::RuntimeArgs;

use crate::area::Area;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RwOp {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RwError {
    /// Unknown area or data block.
    ObjectMissing,
    /// Offset or length outside the area.
    OutOfRange,
    /// Write not aligned to the mapped element size.
    Misaligned,
    /// Transport size or operation the server does not serve.
    Unsupported,
}

impl RwError {
    /// Protocol item return code.
    pub fn return_code(self) -> u8 {
        match self {
            RwError::ObjectMissing => 0x0a,
            RwError::OutOfRange | RwError::Misaligned => 0x05,
            RwError::Unsupported => 0x06,
        }
    }
}

/// Serves a read: fills `out` with `out.len()` bytes of area `area`
/// starting at byte `offset`. Unbound cells read as zero.
pub fn read_area(
    args: &RuntimeArgs,
    area: &Area,
    offset: usize,
    out: &mut [u8],
) -> Result<(), RwError> {
    let length = out.len();
    if length == 0 || offset + length > area.size {
        return Err(RwError::OutOfRange);
    }
    let element = area.element_size();
    let first = offset / element;
    let last = (offset + length - 1) / element;
    let ty = area.mapping.ty;
    let start = area.mapping.start;

    let mut staging = area.staging.lock();
    let token = args.acquire_image_lock();
    for slot in first..=last {
        let index = start + slot;
        let at = slot * element;
        match ty.width() {
            ElementWidth::Bit => {
                let mut packed = 0u8;
                for bit in 0..plcr_image::BOOL_BITS {
                    if token.read_bool(ty, index, bit) == Some(true) {
                        packed |= 1 << bit;
                    }
                }
                staging[at] = packed;
            }
            ElementWidth::Byte => {
                staging[at] = token.read_byte(ty, index).unwrap_or(0);
            }
            ElementWidth::Word => {
                let value = token.read_int(ty, index).unwrap_or(0);
                BigEndian::write_u16(&mut staging[at..at + 2], value);
            }
            ElementWidth::DoubleWord => {
                let value = token.read_dint(ty, index).unwrap_or(0);
                BigEndian::write_u32(&mut staging[at..at + 4], value);
            }
            ElementWidth::QuadWord => {
                let value = token.read_lint(ty, index).unwrap_or(0);
                BigEndian::write_u64(&mut staging[at..at + 8], value);
            }
        }
    }
    drop(token);
    out.copy_from_slice(&staging[offset..offset + length]);
    Ok(())
}

/// Serves a write: splits `data` into per-cell journal writes. Writes to
/// input-mapped areas are swallowed by the journal callbacks, by design.
pub fn write_area(
    args: &RuntimeArgs,
    area: &Area,
    offset: usize,
    data: &[u8],
) -> Result<(), RwError> {
    let length = data.len();
    if length == 0 || offset + length > area.size {
        return Err(RwError::OutOfRange);
    }
    let element = area.element_size();
    if offset % element != 0 || length % element != 0 {
        return Err(RwError::Misaligned);
    }
    let ty = area.mapping.ty;
    let start = area.mapping.start;

    for (slot, chunk) in data.chunks_exact(element).enumerate() {
        let index = (start + offset / element + slot) as u16;
        match ty.width() {
            ElementWidth::Bit => {
                for bit in 0..plcr_image::BOOL_BITS as u8 {
                    let value = chunk[0] >> bit & 1 == 1;
                    let _ = args.journal_write_bool(ty, index, bit, value);
                }
            }
            ElementWidth::Byte => {
                let _ = args.journal_write_byte(ty, index, chunk[0]);
            }
            ElementWidth::Word => {
                let _ = args.journal_write_int(ty, index, BigEndian::read_u16(chunk));
            }
            ElementWidth::DoubleWord => {
                let _ = args.journal_write_dint(ty, index, BigEndian::read_u32(chunk));
            }
            ElementWidth::QuadWord => {
                let _ = args.journal_write_lint(ty, index, BigEndian::read_u64(chunk));
            }
        }
    }
    Ok(())
}

/// Reads one bit out of the area's byte `offset`.
pub fn read_bit(
    args: &RuntimeArgs,
    area: &Area,
    offset: usize,
    bit: u8,
) -> Result<bool, RwError> {
    if bit as usize >= plcr_image::BOOL_BITS {
        return Err(RwError::OutOfRange);
    }
    let mut byte = [0u8; 1];
    read_area(args, area, offset, &mut byte)?;
    Ok(byte[0] >> bit & 1 == 1)
}

/// Writes one bit. Only bool-mapped areas can absorb a single-bit write
/// without read-modify-write, which the lock-free write path rules out.
pub fn write_bit(
    args: &RuntimeArgs,
    area: &Area,
    offset: usize,
    bit: u8,
    value: bool,
) -> Result<(), RwError> {
    if bit as usize >= plcr_image::BOOL_BITS {
        return Err(RwError::OutOfRange);
    }
    if offset >= area.size {
        return Err(RwError::OutOfRange);
    }
    let ty = area.mapping.ty;
    if !ty.is_bool() {
        return Err(RwError::Unsupported);
    }
    let index = (area.mapping.start + offset) as u16;
    let _ = args.journal_write_bool(ty, index, bit, value);
    Ok(())
}
