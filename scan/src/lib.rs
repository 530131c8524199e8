//! PLCR scan-cycle engine.
//!
//! The heart of the runtime: a single `ScanCycle` thread drives the control
//! program at the period the program exports, with the invariant tick body
//! of one scan:
//!
//! 1. take the image lock,
//! 2. apply the journal,
//! 3. run plugin `cycle_start` hooks,
//! 4. run the control program and advance its clock,
//! 5. run plugin `cycle_end` hooks,
//! 6. release the lock, record timing, publish a heartbeat,
//! 7. sleep until the next scheduled tick.
//!
//! A tick body that outruns the period counts an overrun and the next tick
//! starts immediately. Missed ticks are never replayed, so a transient
//! spike slows the plant down instead of stopping it.
//!
//! External commands (`start`, `stop`, `status`, `reload`) arrive over the
//! controller channel and are served between ticks, so every observer sees
//! the state machine move only at tick boundaries.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use plcr_channel::{after, bounded, select, Receiver, Request, Sender, DEFAULT_CHANNEL_SIZE};
use plcr_journal::Journal;
use plcr_logger::{error, info, warn};
use plcr_plugin::PluginHost;
use plcr_program::Program;
use plcr_stop_handler::{new_crossbeam_exit_rx, register_thread};
use thiserror::Error;

mod stats;

#[cfg(test)]
mod tests;

pub use stats::{RollingStat, TimingStats};

/// Engine states. `Error` is terminal until an external `reload`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Empty,
    Init,
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ScanState::Empty => "EMPTY",
            ScanState::Init => "INIT",
            ScanState::Running => "RUNNING",
            ScanState::Stopped => "STOPPED",
            ScanState::Error => "ERROR",
        };
        write!(f, "{name}")
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScanError {
    #[error("no control program loaded")]
    NoProgramLoaded,
    #[error("engine faulted, reload the control program to reset")]
    EngineFaulted,
    #[error("engine is running, stop it first")]
    StillRunning,
    #[error("reload failed: {0}")]
    Reload(String),
    #[error("scan service unavailable")]
    ServiceUnavailable,
}

/// Read-only view served to `status` queries.
#[derive(Clone, Copy, Debug)]
pub struct StatusSnapshot {
    pub state: ScanState,
    pub tick_counter: u64,
    pub timing: TimingStats,
}

enum Message {
    Start(Request<(), Result<(), ScanError>>),
    Stop(Request<(), Result<(), ScanError>>),
    Status(Request<(), StatusSnapshot>),
    Reload(Request<(), Result<(), ScanError>>),
}

/// Handle to the scan service; cheap to clone, safe from any thread.
#[derive(Clone)]
pub struct ScanController {
    sender: Sender<Message>,
}

impl ScanController {
    fn roundtrip<R>(&self, wrap: impl FnOnce(Request<(), R>) -> Message) -> Option<R> {
        let (responder, response) = bounded(plcr_channel::ONESHOT_CHANNEL_SIZE);
        self.sender
            .send(wrap(Request {
                responder,
                arguments: (),
            }))
            .ok()?;
        response.recv().ok()
    }

    pub fn start(&self) -> Result<(), ScanError> {
        self.roundtrip(Message::Start)
            .unwrap_or(Err(ScanError::ServiceUnavailable))
    }

    pub fn stop(&self) -> Result<(), ScanError> {
        self.roundtrip(Message::Stop)
            .unwrap_or(Err(ScanError::ServiceUnavailable))
    }

    pub fn status(&self) -> Result<StatusSnapshot, ScanError> {
        self.roundtrip(Message::Status)
            .ok_or(ScanError::ServiceUnavailable)
    }

    pub fn reload(&self) -> Result<(), ScanError> {
        self.roundtrip(Message::Reload)
            .unwrap_or(Err(ScanError::ServiceUnavailable))
    }
}

/// Builder-side of the engine: owns everything the scan thread will own.
pub struct ScanService {
    program: Option<Program>,
    program_path: Option<PathBuf>,
    host: Arc<PluginHost>,
    autostart: bool,
    heartbeat: Option<Sender<Instant>>,
}

impl ScanService {
    pub fn new(
        program: Option<Program>,
        program_path: Option<PathBuf>,
        host: Arc<PluginHost>,
        autostart: bool,
        heartbeat: Option<Sender<Instant>>,
    ) -> ScanService {
        ScanService {
            program,
            program_path,
            host,
            autostart,
            heartbeat,
        }
    }

    /// Spawns the `ScanCycle` thread and returns its controller.
    pub fn start(self) -> ScanController {
        let (sender, receiver) = bounded(DEFAULT_CHANNEL_SIZE);
        let stop_rx = new_crossbeam_exit_rx();
        let autostart = self.autostart;
        let mut worker = Worker {
            program: self.program,
            program_path: self.program_path,
            host: self.host,
            heartbeat: self.heartbeat,
            stats: Arc::new(Mutex::new(TimingStats::default())),
            state: ScanState::Empty,
            tick_counter: 0,
            plugins_started: false,
            hook_budget_warned: false,
        };
        let thread = thread::Builder::new()
            .name("ScanCycle".to_string())
            .spawn(move || worker.run(receiver, stop_rx, autostart))
            .expect("Start ScanCycle thread failed");
        register_thread("ScanCycle", thread);
        ScanController { sender }
    }
}

struct Worker {
    program: Option<Program>,
    program_path: Option<PathBuf>,
    host: Arc<PluginHost>,
    heartbeat: Option<Sender<Instant>>,
    stats: Arc<Mutex<TimingStats>>,
    state: ScanState,
    tick_counter: u64,
    plugins_started: bool,
    hook_budget_warned: bool,
}

impl Worker {
    fn run(&mut self, receiver: Receiver<Message>, stop_rx: Receiver<()>, autostart: bool) {
        if let Some(program) = &self.program {
            let guard = plcr_image::lock();
            program.bind(&guard);
            drop(guard);
            info!(
                "control program {} bound, tick period {:?}",
                program.name(),
                program.tick_period()
            );
            self.state = ScanState::Init;
        }
        if autostart {
            if let Err(err) = self.start_running() {
                warn!("autostart skipped: {err}");
            }
        }

        let mut next_deadline = Instant::now();
        'outer: loop {
            if self.state != ScanState::Running {
                select! {
                    recv(stop_rx) -> _ => break 'outer,
                    recv(receiver) -> message => match message {
                        Ok(message) => {
                            if self.dispatch(message) {
                                next_deadline = Instant::now();
                            }
                        }
                        Err(_) => break 'outer,
                    },
                }
                continue;
            }

            let period = self
                .program
                .as_ref()
                .expect("RUNNING implies a loaded program")
                .tick_period();
            let scheduled = next_deadline;
            let wake = Instant::now();
            let latency = wake.saturating_duration_since(scheduled);

            let tick_outcome = self.tick();
            let scan_time = wake.elapsed();
            {
                let mut stats = self.stats.lock();
                stats.scan.record(scan_time);
                stats.latency.record(latency);
            }

            match tick_outcome {
                Ok(hook_time) => {
                    if !self.hook_budget_warned && period > Duration::ZERO && hook_time > period / 4
                    {
                        warn!(
                            "cycle hooks consumed {hook_time:?} of a {period:?} tick; \
                             hooks must stay short and non-blocking"
                        );
                        self.hook_budget_warned = true;
                    }
                }
                Err(fault) => {
                    error!(
                        "control program faulted at tick {}: {fault}",
                        self.tick_counter
                    );
                    self.state = ScanState::Error;
                    continue;
                }
            }

            self.tick_counter += 1;
            if let Some(heartbeat) = &self.heartbeat {
                let _ = heartbeat.send(Instant::now());
            }

            next_deadline = scheduled + period;
            let now = Instant::now();
            if now >= next_deadline {
                // Overrun: start the next tick immediately, no catch-up.
                self.stats.lock().overruns += 1;
                next_deadline = now;
                if stop_rx.try_recv().is_ok() {
                    break 'outer;
                }
                match receiver.try_recv() {
                    Ok(message) => {
                        if self.dispatch(message) {
                            next_deadline = Instant::now();
                        }
                    }
                    Err(plcr_channel::TryRecvError::Empty) => {}
                    Err(plcr_channel::TryRecvError::Disconnected) => break 'outer,
                }
                continue;
            }

            // The tick's single suspension point: sleep to the deadline,
            // still serving commands and the stop signal.
            loop {
                let now = Instant::now();
                if now >= next_deadline {
                    break;
                }
                select! {
                    recv(stop_rx) -> _ => break 'outer,
                    recv(receiver) -> message => match message {
                        Ok(message) => {
                            if self.dispatch(message) {
                                next_deadline = Instant::now();
                            }
                            if self.state != ScanState::Running {
                                break;
                            }
                        }
                        Err(_) => break 'outer,
                    },
                    recv(after(next_deadline - now)) -> _ => break,
                }
            }
        }
        info!(
            "ScanCycle exiting in state {} at tick {}",
            self.state, self.tick_counter
        );
    }

    /// One locked scan. Returns the time spent in cycle hooks, or the fault
    /// message if the control program panicked.
    fn tick(&self) -> Result<Duration, String> {
        let guard = plcr_image::lock();
        Journal::global().apply_and_clear(&guard);

        let hooks_begin = Instant::now();
        self.host.cycle_start(&guard);
        let hook_time = hooks_begin.elapsed();

        let program = self
            .program
            .as_ref()
            .expect("RUNNING implies a loaded program");
        let tick = self.tick_counter;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            program.run(tick);
            program.update_time();
        }));
        if let Err(payload) = outcome {
            return Err(panic_message(payload));
        }

        let hooks_begin = Instant::now();
        self.host.cycle_end(&guard);
        Ok(hook_time + hooks_begin.elapsed())
    }

    /// Returns true when the engine (re)entered RUNNING and the tick
    /// schedule must restart from now.
    fn dispatch(&mut self, message: Message) -> bool {
        match message {
            Message::Start(request) => {
                let was_running = self.state == ScanState::Running;
                let result = self.start_running();
                let restarted = result.is_ok() && !was_running;
                let _ = request.responder.send(result);
                restarted
            }
            Message::Stop(request) => {
                let _ = request.responder.send(self.stop_running());
                false
            }
            Message::Status(request) => {
                let _ = request.responder.send(StatusSnapshot {
                    state: self.state,
                    tick_counter: self.tick_counter,
                    timing: *self.stats.lock(),
                });
                false
            }
            Message::Reload(request) => {
                let _ = request.responder.send(self.reload());
                false
            }
        }
    }

    fn start_running(&mut self) -> Result<(), ScanError> {
        match self.state {
            ScanState::Running => Ok(()),
            ScanState::Error => Err(ScanError::EngineFaulted),
            ScanState::Empty => Err(ScanError::NoProgramLoaded),
            ScanState::Init | ScanState::Stopped => {
                if !self.plugins_started {
                    self.host.start_all();
                    self.plugins_started = true;
                }
                info!("scan cycle starting");
                self.state = ScanState::Running;
                Ok(())
            }
        }
    }

    fn stop_running(&mut self) -> Result<(), ScanError> {
        if self.state == ScanState::Running {
            info!("scan cycle stopped at tick {}", self.tick_counter);
            self.state = ScanState::Stopped;
        }
        Ok(())
    }

    fn reload(&mut self) -> Result<(), ScanError> {
        if self.state == ScanState::Running {
            return Err(ScanError::StillRunning);
        }
        let program = match &self.program_path {
            Some(path) => {
                Program::load(path).map_err(|err| ScanError::Reload(err.to_string()))?
            }
            None => plcr_program::blank(),
        };
        let guard = plcr_image::lock();
        plcr_image::unbind_all(&guard);
        program.bind(&guard);
        drop(guard);
        info!("control program {} reloaded", program.name());
        self.program = Some(program);
        self.state = ScanState::Init;
        Ok(())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast_ref::<&str>() {
        Some(message) => (*message).to_string(),
        None => match payload.downcast_ref::<String>() {
            Some(message) => message.clone(),
            None => String::from("Box<Any>"),
        },
    }
}
