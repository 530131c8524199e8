//! PLCR control-program module loader.
//!
//! The control program is an opaque module: the runtime resolves six entry
//! points by symbol name, pushes the image-table base pointers into it, and
//! from then on only ever calls it from the scan-cycle thread. A program
//! normally arrives as a dynamic library compiled by the upload pipeline;
//! [`Program::from_static`] embeds one compiled into the process instead,
//! which is how the built-in blank program and the test programs work.

use std::path::{Path, PathBuf};
use std::time::Duration;

use libloading::Library;
use plcr_image::{BufferPointers, ImageGuard};
use thiserror::Error;

mod blank;

pub use blank::blank;

/// Fallback tick period when the module exports a zero `common_ticktime`.
pub const DEFAULT_TICK_NS: u64 = 50_000_000;

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("loading control program {path}: {source}")]
    ModuleLoadFailed {
        path: PathBuf,
        source: libloading::Error,
    },
    #[error("control program {path} lacks entry point `{symbol}`")]
    EntryPointMissing { path: PathBuf, symbol: &'static str },
}

/// The six entry points of a control program, resolved once at load time.
#[derive(Clone, Copy)]
pub struct ProgramVTable {
    pub config_init: unsafe extern "C-unwind" fn(),
    pub config_run: unsafe extern "C-unwind" fn(u64),
    pub update_time: unsafe extern "C-unwind" fn(),
    pub glue_vars: unsafe extern "C-unwind" fn(),
    pub set_buffer_pointers: unsafe extern "C-unwind" fn(*const BufferPointers),
    /// Tick period in nanoseconds, read from the module's `common_ticktime`.
    pub common_ticktime: u64,
}

/// A loaded control program. Keeps the backing library alive for as long as
/// any of the resolved entry points may run.
pub struct Program {
    name: String,
    path: Option<PathBuf>,
    _module: Option<Library>,
    vtable: ProgramVTable,
    tick_ns: u64,
}

impl Program {
    /// Loads a control-program module from a dynamic library.
    pub fn load(path: &Path) -> Result<Program, ProgramError> {
        let module = unsafe { Library::new(path) }.map_err(|source| {
            ProgramError::ModuleLoadFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;

        macro_rules! resolve {
            ($name:literal, $ty:ty) => {
                unsafe {
                    module
                        .get::<$ty>(concat!($name, "\0").as_bytes())
                        .map(|symbol| *symbol)
                        .map_err(|_| ProgramError::EntryPointMissing {
                            path: path.to_path_buf(),
                            symbol: $name,
                        })?
                }
            };
        }

        let vtable = ProgramVTable {
            config_init: resolve!("config_init", unsafe extern "C-unwind" fn()),
            config_run: resolve!("config_run", unsafe extern "C-unwind" fn(u64)),
            update_time: resolve!("update_time", unsafe extern "C-unwind" fn()),
            glue_vars: resolve!("glue_vars", unsafe extern "C-unwind" fn()),
            set_buffer_pointers: resolve!(
                "set_buffer_pointers",
                unsafe extern "C-unwind" fn(*const BufferPointers)
            ),
            common_ticktime: unsafe {
                let ticktime = resolve!("common_ticktime", *const u64);
                *ticktime
            },
        };

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("program"));

        Ok(Self::assemble(name, Some(path.to_path_buf()), Some(module), vtable))
    }

    /// Wraps a compiled-in program.
    pub fn from_static(name: &str, vtable: ProgramVTable) -> Program {
        Self::assemble(name.to_string(), None, None, vtable)
    }

    fn assemble(
        name: String,
        path: Option<PathBuf>,
        module: Option<Library>,
        vtable: ProgramVTable,
    ) -> Program {
        let tick_ns = if vtable.common_ticktime == 0 {
            plcr_logger::warn!(
                "control program {name} exports a zero tick period, using {DEFAULT_TICK_NS} ns"
            );
            DEFAULT_TICK_NS
        } else {
            vtable.common_ticktime
        };
        Program {
            name,
            path,
            _module: module,
            vtable,
            tick_ns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The scan period the module asked for.
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(self.tick_ns)
    }

    /// Pushes the table base pointers into the module and lets it establish
    /// and wire its variable storage. Runs under the image lock so a reload
    /// can never race a tick.
    pub fn bind(&self, _guard: &ImageGuard) {
        let pointers = plcr_image::base_pointers();
        unsafe {
            (self.vtable.set_buffer_pointers)(&pointers);
            (self.vtable.config_init)();
            (self.vtable.glue_vars)();
        }
    }

    /// Advances the control logic by one tick.
    pub fn run(&self, tick_counter: u64) {
        unsafe { (self.vtable.config_run)(tick_counter) }
    }

    /// Advances the module's internal clock.
    pub fn update_time(&self) {
        unsafe { (self.vtable.update_time)() }
    }
}

#[cfg(test)]
mod tests;
