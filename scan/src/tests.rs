use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use parking_lot::Mutex;
use plcr_journal::Journal;
use plcr_plugin::PluginHost;
use plcr_program::{Program, ProgramVTable};

use super::*;

// Image tables, journal and stop handler are process-wide; tests must not
// interleave.
static TEST_SERIAL: Mutex<()> = Mutex::new(());

// Knobs for the embedded test program, reset by `setup`.
static RUN_SLEEP_MS: AtomicU64 = AtomicU64::new(0);
static PANIC_ARMED: AtomicBool = AtomicBool::new(false);

unsafe extern "C-unwind" fn config_init() {}

unsafe extern "C-unwind" fn config_run(_tick: u64) {
    let ms = RUN_SLEEP_MS.load(Ordering::SeqCst);
    if ms > 0 {
        sleep(Duration::from_millis(ms));
    }
    if PANIC_ARMED.load(Ordering::SeqCst) {
        panic!("injected control fault");
    }
}

unsafe extern "C-unwind" fn update_time() {}

unsafe extern "C-unwind" fn glue_vars() {}

unsafe extern "C-unwind" fn set_buffer_pointers(_: *const plcr_image::BufferPointers) {}

fn test_program(tick_ns: u64) -> Program {
    Program::from_static(
        "scan-test",
        ProgramVTable {
            config_init,
            config_run,
            update_time,
            glue_vars,
            set_buffer_pointers,
            common_ticktime: tick_ns,
        },
    )
}

fn setup() {
    RUN_SLEEP_MS.store(0, Ordering::SeqCst);
    PANIC_ARMED.store(false, Ordering::SeqCst);
    plcr_image::init();
    Journal::global().init();
}

fn bind_int_output(index: usize) -> *mut u16 {
    let cell: &'static mut u16 = Box::leak(Box::new(0));
    let ptr = cell as *mut u16;
    unsafe {
        *plcr_image::base_pointers().int_output.add(index) = ptr;
    }
    ptr
}

fn spawn(program: Option<Program>, autostart: bool) -> ScanController {
    let host = Arc::new(PluginHost::new());
    ScanService::new(program, None, host, autostart, None).start()
}

#[test]
fn journal_writes_land_on_the_next_tick() {
    let _serial = TEST_SERIAL.lock();
    setup();
    let cell = bind_int_output(7);

    let controller = spawn(Some(test_program(2_000_000)), false);
    assert_eq!(controller.status().unwrap().state, ScanState::Init);
    controller.start().unwrap();

    Journal::global().write_int(6, 7, 0x1234).unwrap();
    sleep(Duration::from_millis(100));

    let status = controller.status().unwrap();
    assert_eq!(status.state, ScanState::Running);
    assert!(status.tick_counter >= 1);
    assert_eq!(unsafe { *cell }, 0x1234);
    assert_eq!(Journal::global().pending(), 0);
    assert!(status.timing.scan.count() >= 1);
    assert!(status.timing.latency.count() >= 1);

    controller.stop().unwrap();
    assert_eq!(controller.status().unwrap().state, ScanState::Stopped);
}

#[test]
fn overruns_count_but_ticks_still_advance() {
    let _serial = TEST_SERIAL.lock();
    setup();
    RUN_SLEEP_MS.store(3, Ordering::SeqCst);

    let controller = spawn(Some(test_program(1_000_000)), true);
    sleep(Duration::from_millis(100));

    let status = controller.status().unwrap();
    assert_eq!(status.state, ScanState::Running);
    assert!(status.timing.overruns >= 2);
    assert!(status.tick_counter >= 2);
    // Fail-sloppy: every overrun tick still advances the counter by one.
    assert!(status.tick_counter >= status.timing.overruns);

    controller.stop().unwrap();
}

#[test]
fn starting_from_empty_is_refused() {
    let _serial = TEST_SERIAL.lock();
    setup();
    let controller = spawn(None, false);
    assert_eq!(controller.status().unwrap().state, ScanState::Empty);
    assert_eq!(controller.start(), Err(ScanError::NoProgramLoaded));
}

#[test]
fn control_fault_parks_the_engine_until_reload() {
    let _serial = TEST_SERIAL.lock();
    setup();
    PANIC_ARMED.store(true, Ordering::SeqCst);

    let controller = spawn(Some(test_program(2_000_000)), true);
    sleep(Duration::from_millis(100));

    assert_eq!(controller.status().unwrap().state, ScanState::Error);
    assert_eq!(controller.start(), Err(ScanError::EngineFaulted));

    // Reload is the external reset; with no module path configured it
    // falls back to the blank program.
    PANIC_ARMED.store(false, Ordering::SeqCst);
    controller.reload().unwrap();
    assert_eq!(controller.status().unwrap().state, ScanState::Init);
    controller.start().unwrap();
    sleep(Duration::from_millis(50));
    assert_eq!(controller.status().unwrap().state, ScanState::Running);
    controller.stop().unwrap();
}

#[test]
fn reload_is_rejected_while_running() {
    let _serial = TEST_SERIAL.lock();
    setup();
    let controller = spawn(Some(test_program(2_000_000)), true);
    sleep(Duration::from_millis(20));

    assert_eq!(controller.reload(), Err(ScanError::StillRunning));
    controller.stop().unwrap();
    controller.stop().unwrap();
    controller.reload().unwrap();
}
