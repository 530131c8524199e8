//! PLCR executable.
//!
//! The heavy lifting lives in the `plcr-bin` crate; this shell only converts
//! the outcome into a process exit status.

fn main() {
    if let Err(exit_code) = plcr_bin::run_app() {
        ::std::process::exit(exit_code.into());
    }
}
