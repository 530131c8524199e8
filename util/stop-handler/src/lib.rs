//! Process-wide cooperative shutdown.
//!
//! Every service thread takes an exit receiver via [`new_crossbeam_exit_rx`]
//! and registers its join handle via [`register_thread`]. A single call to
//! [`broadcast_exit_signals`], typically from the SIGINT handler, wakes
//! them all; [`wait_all_services_exit`] then joins them in registration
//! order. The `keep_running` flag itself is exposed through
//! [`has_received_stop_signal`] for code that polls instead of selecting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use plcr_channel::{bounded, Receiver, Sender, SIGNAL_CHANNEL_SIZE};
use plcr_logger::{debug, info, warn};

static RECEIVED_STOP_SIGNAL: AtomicBool = AtomicBool::new(false);

static CROSSBEAM_EXIT_SENDERS: Lazy<Mutex<Vec<Sender<()>>>> = Lazy::new(|| Mutex::new(Vec::new()));

static THREAD_GUARDS: Lazy<Mutex<Vec<(String, JoinHandle<()>)>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Creates a fresh exit receiver wired to the global broadcast.
///
/// If the stop signal has already been broadcast the receiver is
/// pre-loaded, so late subscribers still observe the shutdown.
pub fn new_crossbeam_exit_rx() -> Receiver<()> {
    let (tx, rx) = bounded(SIGNAL_CHANNEL_SIZE);
    if has_received_stop_signal() {
        let _ = tx.try_send(());
    }
    CROSSBEAM_EXIT_SENDERS.lock().push(tx);
    rx
}

/// Flips the process-wide `keep_running` flag and wakes every subscriber.
pub fn broadcast_exit_signals() {
    info!("Broadcasting exit signal to all services");
    RECEIVED_STOP_SIGNAL.store(true, Ordering::SeqCst);
    for sender in CROSSBEAM_EXIT_SENDERS.lock().iter() {
        // A full channel means the service already has an unread signal.
        let _ = sender.try_send(());
    }
}

/// Whether the stop signal has been broadcast.
pub fn has_received_stop_signal() -> bool {
    RECEIVED_STOP_SIGNAL.load(Ordering::SeqCst)
}

/// Registers a service thread to be joined at shutdown.
pub fn register_thread(name: &str, thread: JoinHandle<()>) {
    debug!("Registering thread {name}");
    THREAD_GUARDS.lock().push((name.to_string(), thread));
}

/// Joins every registered service thread, in registration order.
pub fn wait_all_services_exit() {
    let mut guards = THREAD_GUARDS.lock();
    for (name, join_handle) in guards.drain(..) {
        match join_handle.join() {
            Ok(_) => {
                info!("Waiting thread {name} done");
            }
            Err(e) => {
                warn!("Waiting thread {name}: ERROR: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn broadcast_wakes_subscribers_and_sets_flag() {
        let rx = new_crossbeam_exit_rx();
        let handle = thread::spawn(move || {
            rx.recv_timeout(Duration::from_secs(5)).is_ok()
        });
        broadcast_exit_signals();
        assert!(handle.join().unwrap());
        assert!(has_received_stop_signal());

        // Late subscribers observe the already-broadcast signal.
        let late = new_crossbeam_exit_rx();
        assert!(late.try_recv().is_ok());
    }
}
