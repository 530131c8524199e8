use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Mutex;

use plcr_image::BufferType;

use super::*;

// Table reads below go through the process-wide image singleton.
static TEST_SERIAL: Mutex<()> = Mutex::new(());

static RECORDED_WRITES: Mutex<Vec<(u8, u16, u8, u64)>> = Mutex::new(Vec::new());
static RECORDED_LOGS: Mutex<Vec<String>> = Mutex::new(Vec::new());

extern "C-unwind" fn log_record(message: *const c_char) {
    let message = unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned();
    RECORDED_LOGS.lock().unwrap().push(message);
}

extern "C-unwind" fn write_bool(ty: u8, index: u16, bit: u8, value: u8) -> i32 {
    RECORDED_WRITES
        .lock()
        .unwrap()
        .push((ty, index, bit, value as u64));
    STATUS_OK
}

extern "C-unwind" fn write_byte(ty: u8, index: u16, value: u8) -> i32 {
    RECORDED_WRITES
        .lock()
        .unwrap()
        .push((ty, index, 0xff, value as u64));
    STATUS_OK
}

extern "C-unwind" fn write_int(ty: u8, index: u16, value: u16) -> i32 {
    RECORDED_WRITES
        .lock()
        .unwrap()
        .push((ty, index, 0xff, value as u64));
    STATUS_OK
}

extern "C-unwind" fn write_dint(ty: u8, index: u16, value: u32) -> i32 {
    RECORDED_WRITES
        .lock()
        .unwrap()
        .push((ty, index, 0xff, value as u64));
    STATUS_OK
}

extern "C-unwind" fn write_lint_refused(_ty: u8, _index: u16, _value: u64) -> i32 {
    STATUS_FAILED
}

pub(crate) fn test_args() -> RuntimeArgs {
    RuntimeArgs {
        buffers: plcr_image::base_pointers(),
        buffer_size: plcr_image::BUFFER_SIZE as u16,
        lock_image: plcr_image::image_lock_acquire,
        unlock_image: plcr_image::image_lock_release,
        log_info: log_record,
        log_debug: log_record,
        log_warn: log_record,
        log_error: log_record,
        write_bool,
        write_byte,
        write_int,
        write_dint,
        write_lint: write_lint_refused,
        config_path: [0; CONFIG_PATH_MAX],
    }
}

#[test]
fn config_path_round_trips_and_empty_is_none() {
    let _serial = TEST_SERIAL.lock().unwrap();
    let mut args = test_args();
    assert_eq!(args.config_path(), None);
    args.set_config_path(Path::new("/etc/plcr/s7.json"));
    assert_eq!(
        args.config_path().as_deref(),
        Some(Path::new("/etc/plcr/s7.json"))
    );
}

#[test]
fn token_reads_bound_cells_under_the_lock() {
    let _serial = TEST_SERIAL.lock().unwrap();
    plcr_image::init();
    let cell: &'static mut u16 = Box::leak(Box::new(0x0102));
    unsafe {
        *plcr_image::base_pointers().int_input.add(4) = cell as *mut u16;
    }

    let args = test_args();
    let token = args.acquire_image_lock();
    assert_eq!(token.read_int(BufferType::IntInput, 4), Some(0x0102));
    assert_eq!(token.read_int(BufferType::IntInput, 5), None);
    // A non-int family through the int reader yields nothing.
    assert_eq!(token.read_int(BufferType::ByteOutput, 4), None);
    drop(token);

    // The token released the lock: taking it again must not deadlock.
    let guard = plcr_image::lock();
    drop(guard);
}

#[test]
fn journal_helpers_forward_and_surface_status() {
    let _serial = TEST_SERIAL.lock().unwrap();
    RECORDED_WRITES.lock().unwrap().clear();
    let args = test_args();

    args.journal_write_int(BufferType::IntOutput, 7, 0x1234).unwrap();
    args.journal_write_bool(BufferType::BoolOutput, 1, 3, true)
        .unwrap();
    assert_eq!(
        args.journal_write_lint(BufferType::LintOutput, 0, 9),
        Err(STATUS_FAILED)
    );

    let recorded = RECORDED_WRITES.lock().unwrap();
    assert_eq!(recorded[0], (6, 7, 0xff, 0x1234));
    assert_eq!(recorded[1], (1, 1, 3, 1));
}

#[test]
fn log_helpers_emit_via_the_callbacks() {
    let _serial = TEST_SERIAL.lock().unwrap();
    RECORDED_LOGS.lock().unwrap().clear();
    let args = test_args();
    args.info("listener bound");
    args.error("bind failed");
    let logs = RECORDED_LOGS.lock().unwrap();
    assert_eq!(logs.as_slice(), ["listener bound", "bind failed"]);
}
