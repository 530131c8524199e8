//! PLCR plugin host.
//!
//! Reads the plugin list, loads each enabled extension, hands it a
//! [`RuntimeArgs`](plcr_plugin_api::RuntimeArgs) bundle, and drives the
//! lifecycle `init → start → (ticks) → stop → cleanup`. Native plugins are
//! dynamic libraries resolved by symbol name; compiled-in plugins register a
//! vtable under a well-known name and a descriptor binds to them by `path`.
//!
//! Every entry-point invocation runs inside a failure boundary: a panicking
//! plugin is logged, marked unhealthy and loses its hooks, but never takes
//! the runtime down with it. Its final `stop`/`cleanup` still run, so a
//! half-dead plugin cannot leak sockets or threads past shutdown.

mod args;
mod descriptor;
mod host;


pub use descriptor::{parse_descriptor_file, parse_descriptor_line, PluginDescriptor, PluginKind};
pub use host::PluginHost;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin config {path}: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line {line}: expected 6 comma-separated fields")]
    MalformedDescriptor { line: usize },
    #[error("line {line}: unknown plugin kind `{kind}`")]
    UnknownKind { line: usize, kind: String },
    #[error("loading module {path}: {source}")]
    ModuleLoadFailed {
        path: String,
        source: libloading::Error,
    },
    #[error("module {path} lacks entry point `{symbol}`")]
    EntryPointMissing { path: String, symbol: &'static str },
    #[error("scripted plugins are not supported in this build")]
    ScriptedUnsupported,
    #[error("init returned status {0}")]
    InitFailed(i32),
    #[error("init panicked")]
    InitPanicked,
}
