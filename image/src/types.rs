use crate::{BOOL_BITS, BUFFER_SIZE};

/// One row of bit-cell pointers; bool families are addressed `[index][bit]`.
pub type BoolRow = [*mut u8; BOOL_BITS];

/// The fourteen buffer-type codes, the sole cross-boundary identifier for a
/// (family × element-width) pair. The numeric values are wire-visible and
/// must not change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferType {
    BoolInput = 0,
    BoolOutput = 1,
    BoolMemory = 2,
    ByteInput = 3,
    ByteOutput = 4,
    IntInput = 5,
    IntOutput = 6,
    IntMemory = 7,
    DintInput = 8,
    DintOutput = 9,
    DintMemory = 10,
    LintInput = 11,
    LintOutput = 12,
    LintMemory = 13,
}

/// Element width of a buffer family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementWidth {
    Bit,
    Byte,
    Word,
    DoubleWord,
    QuadWord,
}

impl ElementWidth {
    /// Width in bits.
    pub fn bits(self) -> u8 {
        match self {
            ElementWidth::Bit => 1,
            ElementWidth::Byte => 8,
            ElementWidth::Word => 16,
            ElementWidth::DoubleWord => 32,
            ElementWidth::QuadWord => 64,
        }
    }

    /// Width in bytes as seen by a byte-addressed protocol; a bit element
    /// packs with seven siblings into one byte.
    pub fn protocol_bytes(self) -> usize {
        match self {
            ElementWidth::Bit | ElementWidth::Byte => 1,
            ElementWidth::Word => 2,
            ElementWidth::DoubleWord => 4,
            ElementWidth::QuadWord => 8,
        }
    }
}

impl BufferType {
    /// Decodes a wire code; `None` for anything outside `0..14`.
    pub fn from_code(code: u8) -> Option<BufferType> {
        use BufferType::*;
        Some(match code {
            0 => BoolInput,
            1 => BoolOutput,
            2 => BoolMemory,
            3 => ByteInput,
            4 => ByteOutput,
            5 => IntInput,
            6 => IntOutput,
            7 => IntMemory,
            8 => DintInput,
            9 => DintOutput,
            10 => DintMemory,
            11 => LintInput,
            12 => LintOutput,
            13 => LintMemory,
            _ => return None,
        })
    }

    /// The numeric wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn width(self) -> ElementWidth {
        use BufferType::*;
        match self {
            BoolInput | BoolOutput | BoolMemory => ElementWidth::Bit,
            ByteInput | ByteOutput => ElementWidth::Byte,
            IntInput | IntOutput | IntMemory => ElementWidth::Word,
            DintInput | DintOutput | DintMemory => ElementWidth::DoubleWord,
            LintInput | LintOutput | LintMemory => ElementWidth::QuadWord,
        }
    }

    /// Whether writes from plugins are suppressed (input families belong to
    /// the control program alone).
    pub fn is_input(self) -> bool {
        use BufferType::*;
        matches!(
            self,
            BoolInput | ByteInput | IntInput | DintInput | LintInput
        )
    }

    pub fn is_bool(self) -> bool {
        self.width() == ElementWidth::Bit
    }

    /// Mask applied to a 64-bit journal value when it lands in this family.
    pub fn value_mask(self) -> u64 {
        match self.width() {
            ElementWidth::Bit => 0x1,
            ElementWidth::Byte => 0xff,
            ElementWidth::Word => 0xffff,
            ElementWidth::DoubleWord => 0xffff_ffff,
            ElementWidth::QuadWord => u64::MAX,
        }
    }
}

/// Base pointers of every image-table family, the bundle pushed into the
/// control program at bind time and handed to plugins inside their
/// runtime-args. Lengths are implicit: every family has
/// [`BUFFER_SIZE`](crate::BUFFER_SIZE) elements.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct BufferPointers {
    pub bool_input: *mut BoolRow,
    pub bool_output: *mut BoolRow,
    pub bool_memory: *mut BoolRow,
    pub byte_input: *mut *mut u8,
    pub byte_output: *mut *mut u8,
    pub int_input: *mut *mut u16,
    pub int_output: *mut *mut u16,
    pub int_memory: *mut *mut u16,
    pub dint_input: *mut *mut u32,
    pub dint_output: *mut *mut u32,
    pub dint_memory: *mut *mut u32,
    pub lint_input: *mut *mut u64,
    pub lint_output: *mut *mut u64,
    pub lint_memory: *mut *mut u64,
    pub buffer_size: u16,
}

// Safety: the pointers address the process-lifetime table singleton; cell
// access through them is serialised by the image lock.
unsafe impl Send for BufferPointers {}
unsafe impl Sync for BufferPointers {}

impl BufferPointers {
    pub fn buffer_size(&self) -> usize {
        BUFFER_SIZE
    }
}
