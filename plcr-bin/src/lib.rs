//! PLCR executable.
//!
//! This crate is created to keep `main.rs` a shell: argument parsing, the
//! logger guard, and the run wiring live here.

use std::sync::Arc;
use std::time::Duration;

use plcr_app_config::{cli, ExitCode};
use plcr_journal::Journal;
use plcr_logger::{error, info};
use plcr_plugin::PluginHost;
use plcr_program::Program;
use plcr_scan::ScanService;
use plcr_stop_handler::{broadcast_exit_signals, wait_all_services_exit};

mod control;
mod setup;
mod setup_guard;
mod watchdog;

use setup::Setup;
use setup_guard::SetupGuard;

/// The executable main entry. `Err` carries the process exit status.
pub fn run_app() -> Result<(), ExitCode> {
    // Always print backtrace on panic.
    std::env::set_var("RUST_BACKTRACE", "full");

    let matches = cli::basic_app()
        .version(env!("CARGO_PKG_VERSION"))
        .get_matches();
    let setup = Setup::from_matches(&matches)?;
    let _guard = SetupGuard::from_setup(&setup)?;

    run(setup)
}

fn run(setup: Setup) -> Result<(), ExitCode> {
    let config = setup.config;

    plcr_image::init();
    Journal::global().init();

    // A configured-but-unloadable program is fatal; no configured program
    // means the built-in blank program until the first upload.
    let program = match &config.program_path {
        Some(path) => Program::load(path).map_err(|err| {
            eprintln!("Config Error: {err}");
            error!("{err}");
            ExitCode::Config
        })?,
        None => plcr_program::blank(),
    };
    let tick_period = program.tick_period();

    let mut host = PluginHost::new();
    host.register_builtin(plcr_s7_server::PLUGIN_NAME, plcr_s7_server::vtable());
    let loaded = host.load_from_file(&config.plugins_config);
    info!("{loaded} plugin(s) initialised");
    let host = Arc::new(host);

    let (heartbeat_tx, heartbeat_rx) = plcr_channel::unbounded();
    watchdog::spawn(heartbeat_rx, tick_period);

    let controller = ScanService::new(
        Some(program),
        config.program_path.clone(),
        Arc::clone(&host),
        config.autostart,
        Some(heartbeat_tx),
    )
    .start();

    control::start(&config.control_socket, controller).map_err(|err| {
        eprintln!("IO Error: control socket: {err}");
        error!("control socket: {err}");
        ExitCode::Io
    })?;

    ctrlc::set_handler(broadcast_exit_signals).expect("Error setting Ctrl-C handler");

    info!(
        "plcr {} up, state dir {}, tick period {tick_period:?}",
        env!("CARGO_PKG_VERSION"),
        config.state_dir.display()
    );
    wait_all_services_exit();

    // Reverse of bring-up: plugins drain before the singletons go away.
    host.stop_all();
    host.cleanup_all();
    Journal::global().cleanup();
    info!("plcr exited cleanly");
    Ok(())
}

/// Fallback heartbeat staleness floor when the program runs very fast ticks.
pub(crate) const WATCHDOG_FLOOR: Duration = Duration::from_secs(1);
