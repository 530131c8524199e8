use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::*;

// Binding mutates the image-table singleton.
static TEST_SERIAL: Mutex<()> = Mutex::new(());

static RUN_CALLS: AtomicU64 = AtomicU64::new(0);
static LAST_TICK: AtomicU64 = AtomicU64::new(0);
static TIME_CALLS: AtomicU64 = AtomicU64::new(0);

// A minimal in-process control program: one INT output variable wired to
// int_output[2].
static mut OUTPUT_CELL: u16 = 0;
static mut BASES: Option<BufferPointers> = None;

unsafe extern "C-unwind" fn config_init() {
    OUTPUT_CELL = 0;
}

unsafe extern "C-unwind" fn config_run(tick: u64) {
    RUN_CALLS.fetch_add(1, Ordering::SeqCst);
    LAST_TICK.store(tick, Ordering::SeqCst);
    OUTPUT_CELL = OUTPUT_CELL.wrapping_add(1);
}

unsafe extern "C-unwind" fn update_time() {
    TIME_CALLS.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C-unwind" fn glue_vars() {
    let bases = BASES.expect("set_buffer_pointers runs before glue_vars");
    *bases.int_output.add(2) = std::ptr::addr_of_mut!(OUTPUT_CELL);
}

unsafe extern "C-unwind" fn set_buffer_pointers(pointers: *const BufferPointers) {
    BASES = Some(*pointers);
}

fn counting_program() -> Program {
    Program::from_static(
        "counting",
        ProgramVTable {
            config_init,
            config_run,
            update_time,
            glue_vars,
            set_buffer_pointers,
            common_ticktime: 10_000_000,
        },
    )
}

#[test]
fn bind_wires_storage_into_the_tables() {
    let _serial = TEST_SERIAL.lock();
    plcr_image::init();
    let program = counting_program();

    let guard = plcr_image::lock();
    program.bind(&guard);
    assert_eq!(
        plcr_image::read_int(&guard, plcr_image::BufferType::IntOutput, 2),
        Some(0)
    );
    drop(guard);

    program.run(41);
    program.update_time();
    assert_eq!(LAST_TICK.load(Ordering::SeqCst), 41);
    assert!(RUN_CALLS.load(Ordering::SeqCst) >= 1);
    assert!(TIME_CALLS.load(Ordering::SeqCst) >= 1);

    let guard = plcr_image::lock();
    assert_eq!(
        plcr_image::read_int(&guard, plcr_image::BufferType::IntOutput, 2),
        Some(1)
    );
}

#[test]
fn tick_period_comes_from_the_module() {
    let _serial = TEST_SERIAL.lock();
    assert_eq!(
        counting_program().tick_period(),
        Duration::from_millis(10)
    );
}

#[test]
fn zero_tick_period_falls_back_to_default() {
    let _serial = TEST_SERIAL.lock();
    let program = Program::from_static(
        "zero-tick",
        ProgramVTable {
            common_ticktime: 0,
            ..blank_vtable()
        },
    );
    assert_eq!(program.tick_period(), Duration::from_nanos(DEFAULT_TICK_NS));
}

#[test]
fn blank_program_is_inert() {
    let _serial = TEST_SERIAL.lock();
    plcr_image::init();
    let program = blank();
    let guard = plcr_image::lock();
    program.bind(&guard);
    drop(guard);
    program.run(0);
    program.update_time();
    assert_eq!(program.name(), "blank");
    assert_eq!(program.tick_period(), Duration::from_nanos(DEFAULT_TICK_NS));
}

fn blank_vtable() -> ProgramVTable {
    unsafe extern "C-unwind" fn noop() {}
    unsafe extern "C-unwind" fn noop_run(_: u64) {}
    unsafe extern "C-unwind" fn noop_set(_: *const BufferPointers) {}
    ProgramVTable {
        config_init: noop,
        config_run: noop_run,
        update_time: noop,
        glue_vars: noop,
        set_buffer_pointers: noop_set,
        common_ticktime: DEFAULT_TICK_NS,
    }
}
