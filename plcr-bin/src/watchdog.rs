//! The watchdog thread: consumes the heartbeat the scan loop publishes
//! every tick and warns when it goes stale. The actual kill decision
//! belongs to the external supervisor consuming the same signal; this
//! thread only makes the staleness visible in the logs.

use std::thread;
use std::time::{Duration, Instant};

use plcr_channel::{after, select, Receiver};
use plcr_logger::warn;
use plcr_stop_handler::{new_crossbeam_exit_rx, register_thread};

use crate::WATCHDOG_FLOOR;

pub fn spawn(heartbeat_rx: Receiver<Instant>, tick_period: Duration) {
    let stale_after = (tick_period * 3).max(WATCHDOG_FLOOR);
    let stop_rx = new_crossbeam_exit_rx();
    let thread = thread::Builder::new()
        .name("Watchdog".to_string())
        .spawn(move || watch(heartbeat_rx, stop_rx, stale_after))
        .expect("Start Watchdog thread failed");
    register_thread("Watchdog", thread);
}

fn watch(heartbeat_rx: Receiver<Instant>, stop_rx: Receiver<()>, stale_after: Duration) {
    let mut last_beat: Option<Instant> = None;
    let mut warned = false;
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(heartbeat_rx) -> beat => match beat {
                Ok(instant) => {
                    last_beat = Some(instant);
                    warned = false;
                }
                Err(_) => break,
            },
            recv(after(stale_after)) -> _ => {
                if let Some(last) = last_beat {
                    if last.elapsed() >= stale_after && !warned {
                        warn!(
                            "no scan heartbeat for {:?} (threshold {:?})",
                            last.elapsed(),
                            stale_after
                        );
                        warned = true;
                    }
                }
            }
        }
    }
}
