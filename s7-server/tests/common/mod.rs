//! Shared fixture: a runtime-args bundle whose journal callbacks record
//! into a static instead of a live journal, plus image-binding helpers.

#![allow(dead_code)]

use std::sync::Mutex;

use plcr_plugin_api::{RuntimeArgs, CONFIG_PATH_MAX, STATUS_OK};

pub static RECORDED_WRITES: Mutex<Vec<(u8, u16, u8, u64)>> = Mutex::new(Vec::new());

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

extern "C-unwind" fn write_lint(ty: u8, index: u16, value: u64) -> i32 {
    RECORDED_WRITES
        .lock()
        .unwrap()
        .push((ty, index, 0xff, value));
    STATUS_OK
}

extern "C-unwind" fn log_sink(_message: *const std::os::raw::c_char) {}

pub fn test_args() -> RuntimeArgs {
    RuntimeArgs {
        buffers: plcr_image::base_pointers(),
        buffer_size: plcr_image::BUFFER_SIZE as u16,
        lock_image: plcr_image::image_lock_acquire,
        unlock_image: plcr_image::image_lock_release,
        log_info: log_sink,
        log_debug: log_sink,
        log_warn: log_sink,
        log_error: log_sink,
        write_bool,
        write_byte,
        write_int,
        write_dint,
        write_lint,
        config_path: [0; CONFIG_PATH_MAX],
    }
}

pub fn take_writes() -> Vec<(u8, u16, u8, u64)> {
    std::mem::take(&mut *RECORDED_WRITES.lock().unwrap())
}

pub fn bind_int_input(index: usize, value: u16) -> *mut u16 {
    let cell: &'static mut u16 = Box::leak(Box::new(value));
    let ptr = cell as *mut u16;
    unsafe {
        *plcr_image::base_pointers().int_input.add(index) = ptr;
    }
    ptr
}

pub fn bind_int_output(index: usize, value: u16) -> *mut u16 {
    let cell: &'static mut u16 = Box::leak(Box::new(value));
    let ptr = cell as *mut u16;
    unsafe {
        *plcr_image::base_pointers().int_output.add(index) = ptr;
    }
    ptr
}

pub fn bind_bool_input(index: usize, bit: usize, value: bool) {
    let cell: &'static mut u8 = Box::leak(Box::new(value as u8));
    unsafe {
        (*plcr_image::base_pointers().bool_input.add(index))[bit] = cell as *mut u8;
    }
}

pub fn bind_bool_output(index: usize, bit: usize, value: bool) {
    let cell: &'static mut u8 = Box::leak(Box::new(value as u8));
    unsafe {
        (*plcr_image::base_pointers().bool_output.add(index))[bit] = cell as *mut u8;
    }
}
