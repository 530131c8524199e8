//! PLCR command line arguments parser.

use clap::{Arg, ArgAction, Command};

/// The executable name.
pub const BIN_NAME: &str = "plcr";

/// Command line argument `--state-dir`.
pub const ARG_STATE_DIR: &str = "state-dir";
/// Command line argument `--program`.
pub const ARG_PROGRAM: &str = "program";
/// Command line argument `--no-autostart`.
pub const ARG_NO_AUTOSTART: &str = "no-autostart";

/// Builds the top-level argument parser.
pub fn basic_app() -> Command {
    Command::new(BIN_NAME)
        .author("PLCR Core Dev <dev@plcr.io>")
        .about("PLCR, a soft-real-time programmable logic controller runtime")
        .arg(
            Arg::new(ARG_STATE_DIR)
                .long(ARG_STATE_DIR)
                .value_name("PATH")
                .action(ArgAction::Set)
                .help("Runtime state directory (sockets, .env, metadata)"),
        )
        .arg(
            Arg::new(ARG_PROGRAM)
                .long(ARG_PROGRAM)
                .value_name("MODULE")
                .action(ArgAction::Set)
                .help("Control-program module, overriding the .env entry"),
        )
        .arg(
            Arg::new(ARG_NO_AUTOSTART)
                .long(ARG_NO_AUTOSTART)
                .action(ArgAction::SetTrue)
                .help("Stay stopped until the control socket issues `start`"),
        )
}
