//! The built-in blank program: no bindings, no logic, 50 ms tick. Loaded
//! when no control program has been uploaded yet so the runtime (and its
//! plugins) are operable out of the box.

use crate::{Program, ProgramVTable, DEFAULT_TICK_NS};
use plcr_image::BufferPointers;

unsafe extern "C-unwind" fn config_init() {}

unsafe extern "C-unwind" fn config_run(_tick: u64) {}

unsafe extern "C-unwind" fn update_time() {}

unsafe extern "C-unwind" fn glue_vars() {}

unsafe extern "C-unwind" fn set_buffer_pointers(_pointers: *const BufferPointers) {}

/// Builds the blank program.
pub fn blank() -> Program {
    Program::from_static(
        "blank",
        ProgramVTable {
            config_init,
            config_run,
            update_time,
            glue_vars,
            set_buffer_pointers,
            common_ticktime: DEFAULT_TICK_NS,
        },
    )
}
