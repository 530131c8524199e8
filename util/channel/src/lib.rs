//! Reexports `crossbeam_channel` to uniform the dependency version.

pub use crossbeam_channel::{
    after, bounded, select, tick, unbounded, Receiver, RecvError, RecvTimeoutError, SendError,
    Sender, TryRecvError, TrySendError,
};

pub const ONESHOT_CHANNEL_SIZE: usize = 1;
pub const SIGNAL_CHANNEL_SIZE: usize = 1;
pub const DEFAULT_CHANNEL_SIZE: usize = 32;

/// A synchronous request sent to a service thread, paired with the channel
/// the response comes back on.
pub struct Request<A, R> {
    pub responder: Sender<R>,
    pub arguments: A,
}

impl<A, R> Request<A, R> {
    /// Sends `arguments` down `sender` and blocks for the response.
    ///
    /// Returns `None` when the service has gone away, either side of the
    /// round trip.
    pub fn call(sender: &Sender<Request<A, R>>, arguments: A) -> Option<R> {
        let (responder, response) = bounded(ONESHOT_CHANNEL_SIZE);
        sender
            .send(Request {
                responder,
                arguments,
            })
            .ok()?;
        response.recv().ok()
    }
}
