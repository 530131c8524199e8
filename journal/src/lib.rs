//! PLCR journal buffer.
//!
//! Plugins never touch image-table cells directly on their write path;
//! every write goes through this append-only log and lands at the start of
//! the next scan cycle, in the order the writers acquired the journal lock.
//! That gives the tick a deterministic last-writer-wins view of everything
//! the field buses produced since the previous tick, applied atomically
//! under the image lock.
//!
//! Lock ordering is global and strict: image lock before journal lock,
//! always. The normal apply path inherits the image lock from the scan
//! cycle (witnessed by the [`ImageGuard`] parameter); the emergency flush on
//! overflow is the only place the journal acquires the image lock itself,
//! and it releases its own lock first to keep the ordering.

use parking_lot::Mutex;
use plcr_image::{BufferType, ImageGuard, BIT_NONE};
use thiserror::Error;

/// Entry capacity; reaching it triggers the emergency flush.
pub const JOURNAL_CAPACITY: usize = 1024;

/// One logged write. `value` always holds the full 64 bits; narrower
/// families are masked when the entry is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    pub sequence: u32,
    pub buffer_type: u8,
    pub bit_index: u8,
    pub index: u16,
    pub value: u64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JournalError {
    #[error("journal is not initialised")]
    NotInitialised,
    #[error("buffer type {0} is outside the family accepted by this writer")]
    TypeOutOfRange(u8),
    #[error("bit index {0} is outside 0..8")]
    BitOutOfRange(u8),
}

struct JournalState {
    entries: Vec<JournalEntry>,
    next_sequence: u32,
    initialised: bool,
}

/// The process-wide journal. Use [`Journal::global`].
pub struct Journal {
    state: Mutex<JournalState>,
}

static JOURNAL: Journal = Journal {
    state: Mutex::new(JournalState {
        entries: Vec::new(),
        next_sequence: 0,
        initialised: false,
    }),
};

impl Journal {
    /// The singleton instance.
    pub fn global() -> &'static Journal {
        &JOURNAL
    }

    /// Allocates the entry log and marks the journal ready. Must run before
    /// any worker thread starts writing.
    pub fn init(&self) {
        let mut state = self.state.lock();
        state.entries = Vec::with_capacity(JOURNAL_CAPACITY);
        state.next_sequence = 0;
        state.initialised = true;
    }

    /// Marks the journal uninitialised and drops pending entries. Writers
    /// arriving afterwards get [`JournalError::NotInitialised`].
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        state.entries = Vec::new();
        state.next_sequence = 0;
        state.initialised = false;
    }

    /// Pending entry count.
    pub fn pending(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Logs a bool write. `ty` must be a bool family code, `bit` in `0..8`.
    pub fn write_bool(&self, ty: u8, index: u16, bit: u8, value: bool) -> Result<(), JournalError> {
        let ty = Self::expect_family(ty, BufferType::is_bool)?;
        if bit >= plcr_image::BOOL_BITS as u8 {
            return Err(JournalError::BitOutOfRange(bit));
        }
        self.push(ty, index, bit, value as u64)
    }

    /// Logs a byte write. `ty` must be a byte family code.
    pub fn write_byte(&self, ty: u8, index: u16, value: u8) -> Result<(), JournalError> {
        let ty = Self::expect_family(ty, |t| {
            matches!(t, BufferType::ByteInput | BufferType::ByteOutput)
        })?;
        self.push(ty, index, BIT_NONE, value as u64)
    }

    /// Logs a 16-bit write. `ty` must be an int family code.
    pub fn write_int(&self, ty: u8, index: u16, value: u16) -> Result<(), JournalError> {
        let ty = Self::expect_family(ty, |t| {
            matches!(
                t,
                BufferType::IntInput | BufferType::IntOutput | BufferType::IntMemory
            )
        })?;
        self.push(ty, index, BIT_NONE, value as u64)
    }

    /// Logs a 32-bit write. `ty` must be a dint family code.
    pub fn write_dint(&self, ty: u8, index: u16, value: u32) -> Result<(), JournalError> {
        let ty = Self::expect_family(ty, |t| {
            matches!(
                t,
                BufferType::DintInput | BufferType::DintOutput | BufferType::DintMemory
            )
        })?;
        self.push(ty, index, BIT_NONE, value as u64)
    }

    /// Logs a 64-bit write. `ty` must be a lint family code.
    pub fn write_lint(&self, ty: u8, index: u16, value: u64) -> Result<(), JournalError> {
        let ty = Self::expect_family(ty, |t| {
            matches!(
                t,
                BufferType::LintInput | BufferType::LintOutput | BufferType::LintMemory
            )
        })?;
        self.push(ty, index, BIT_NONE, value)
    }

    fn expect_family(
        code: u8,
        accepts: impl Fn(BufferType) -> bool,
    ) -> Result<BufferType, JournalError> {
        match BufferType::from_code(code) {
            Some(ty) if accepts(ty) => Ok(ty),
            _ => Err(JournalError::TypeOutOfRange(code)),
        }
    }

    fn push(&self, ty: BufferType, index: u16, bit: u8, value: u64) -> Result<(), JournalError> {
        // Input families belong to the control program; plugin writes to
        // them are accepted and discarded.
        if ty.is_input() {
            let state = self.state.lock();
            return if state.initialised {
                Ok(())
            } else {
                Err(JournalError::NotInitialised)
            };
        }

        let mut state = self.state.lock();
        if !state.initialised {
            return Err(JournalError::NotInitialised);
        }
        if state.entries.len() == JOURNAL_CAPACITY {
            // Emergency flush. Release our own lock, take the image lock,
            // re-take ours: image-then-journal, the global order.
            drop(state);
            let image_guard = plcr_image::lock();
            state = self.state.lock();
            if !state.initialised {
                return Err(JournalError::NotInitialised);
            }
            if state.entries.len() == JOURNAL_CAPACITY {
                plcr_logger::debug!("journal full, emergency flush of {JOURNAL_CAPACITY} entries");
                Self::apply_locked(&mut state, &image_guard);
            }
            // The insertion below happens with both locks held, so the
            // caller's write cannot race behind another overflow.
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.entries.push(JournalEntry {
                sequence,
                buffer_type: ty.code(),
                bit_index: bit,
                index,
                value,
            });
            return Ok(());
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.push(JournalEntry {
            sequence,
            buffer_type: ty.code(),
            bit_index: bit,
            index,
            value,
        });
        Ok(())
    }

    /// Applies every pending entry to the image tables in sequence order,
    /// then resets the log. The caller must hold the image lock; the scan
    /// cycle does this at the top of every tick.
    pub fn apply_and_clear(&self, image_guard: &ImageGuard) {
        let mut state = self.state.lock();
        Self::apply_locked(&mut state, image_guard);
    }

    fn apply_locked(state: &mut JournalState, image_guard: &ImageGuard) {
        for entry in &state.entries {
            // Codes were validated on insert.
            let Some(ty) = BufferType::from_code(entry.buffer_type) else {
                continue;
            };
            // Unbound slots and out-of-range indices drop silently.
            let _ = plcr_image::store_masked(
                image_guard,
                ty,
                entry.index as usize,
                entry.bit_index,
                entry.value,
            );
        }
        state.entries.clear();
        state.next_sequence = 0;
    }
}
