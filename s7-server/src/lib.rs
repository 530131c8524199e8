//! PLCR reference protocol plugin: an S7-family server over ISO-on-TCP.
//!
//! Exposes named data areas (process inputs `PE`, process outputs `PA`,
//! markers `MK` and numbered data blocks `DB`) to remote HMIs and SCADA
//! masters. Each area is a contiguous byte range mapped onto an
//! image-table family by the per-instance JSON configuration.
//!
//! Remote reads transcode a consistent, image-lock-protected snapshot into
//! network byte order; remote writes never touch the tables directly but
//! fan out into the journal, landing atomically at the next scan tick.
//!
//! The crate doubles as the builtin plugin `s7-server` (see [`vtable`]) and
//! as a library: the codec ([`iso`], [`s7`], [`szl`]) and the data path
//! ([`area`], [`transcode`], [`server`]) are public so integration tests
//! and tooling can speak the protocol without a PLC attached.

pub mod area;
pub mod config;
pub mod iso;
pub mod s7;
pub mod server;
pub mod szl;
pub mod transcode;

mod plugin;

pub use plugin::{area_callback, vtable};

/// Name under which the builtin registers with the plugin host.
pub const PLUGIN_NAME: &str = "s7-server";

pub(crate) const LOG_TARGET: &str = "s7";
