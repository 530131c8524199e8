use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use libloading::Library;
use plcr_image::ImageGuard;
use plcr_logger::{debug, error, info, warn};
use plcr_plugin_api::{
    PluginCycleFn, PluginInitFn, PluginLifecycleFn, PluginVTable, RuntimeArgs, STATUS_OK,
    SYM_CLEANUP, SYM_CYCLE_END, SYM_CYCLE_START, SYM_INIT, SYM_START, SYM_STOP,
};

use crate::args::build_runtime_args;
use crate::descriptor::{parse_descriptor_file, PluginDescriptor, PluginKind};
use crate::PluginError;

struct PluginInstance {
    descriptor: PluginDescriptor,
    // Keeps the dynamic library mapped while the vtable is callable.
    _module: Option<Library>,
    vtable: PluginVTable,
    // The transport copy stays alive for the instance lifetime, so plugins
    // that did not copy their runtime-args keep working anyway.
    _args: Box<RuntimeArgs>,
    healthy: AtomicBool,
}

impl PluginInstance {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The failure boundary around every entry-point invocation. A panic is
    /// logged and marks the instance unhealthy; the caller sees `None`.
    fn boundary<R>(&self, what: &str, call: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(value) => Some(value),
            Err(_) => {
                error!(
                    "plugin {} panicked in {what}; instance marked unhealthy",
                    self.name()
                );
                self.healthy.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    /// Cycle hooks are suppressed once the instance is unhealthy.
    fn hook(&self, what: &str, hook: PluginCycleFn) {
        if !self.healthy.load(Ordering::SeqCst) {
            return;
        }
        self.boundary(what, || unsafe { hook() });
    }

    /// Lifecycle entry points run even for unhealthy instances: `stop` and
    /// `cleanup` are how a half-dead plugin releases its resources.
    fn lifecycle(&self, what: &str, call: PluginLifecycleFn) {
        if let Some(status) = self.boundary(what, || unsafe { call() }) {
            if status != STATUS_OK {
                warn!("plugin {} {what} returned status {status}", self.name());
            }
        }
    }
}

/// The plugin host. Mutated during startup only; the scan thread and the
/// shutdown path see a read-only instance list.
pub struct PluginHost {
    instances: Vec<PluginInstance>,
    builtins: HashMap<String, PluginVTable>,
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginHost {
    pub fn new() -> PluginHost {
        PluginHost {
            instances: Vec::new(),
            builtins: HashMap::new(),
        }
    }

    /// Registers a compiled-in plugin; a descriptor whose `path` equals
    /// `name` binds to this vtable instead of a dynamic library.
    pub fn register_builtin(&mut self, name: &str, vtable: PluginVTable) {
        self.builtins.insert(name.to_string(), vtable);
    }

    /// Loads every enabled descriptor from the plugin list file. A missing
    /// or unreadable file means a plugin-less runtime, not a failure.
    pub fn load_from_file(&mut self, path: &Path) -> usize {
        let descriptors = match parse_descriptor_file(path) {
            Ok(descriptors) => descriptors,
            Err(err) => {
                info!("{err}; starting without plugins");
                return 0;
            }
        };
        let mut loaded = 0;
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            match self.load(descriptor) {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(err) => error!("plugin {name} rejected: {err}"),
            }
        }
        loaded
    }

    /// Loads a single descriptor. `Ok(false)` means the descriptor was
    /// disabled; a failed `init` removes the instance and surfaces the
    /// error to the caller.
    pub fn load(&mut self, descriptor: PluginDescriptor) -> Result<bool, PluginError> {
        if !descriptor.enabled {
            debug!("plugin {} disabled, skipping", descriptor.name);
            return Ok(false);
        }
        if descriptor.kind == PluginKind::Scripted {
            return Err(PluginError::ScriptedUnsupported);
        }

        let (module, vtable) = match self.builtins.get(&descriptor.path) {
            Some(vtable) => (None, *vtable),
            None => {
                let library = unsafe { Library::new(&descriptor.path) }.map_err(|source| {
                    PluginError::ModuleLoadFailed {
                        path: descriptor.path.clone(),
                        source,
                    }
                })?;
                let vtable = resolve_vtable(&library, &descriptor.path)?;
                (Some(library), vtable)
            }
        };

        if let Some(env_path) = &descriptor.env_path {
            load_env_file(&descriptor.name, env_path);
        }

        let args = Box::new(build_runtime_args(descriptor.config_path.as_deref()));
        let status = panic::catch_unwind(AssertUnwindSafe(|| unsafe { (vtable.init)(&*args) }))
            .map_err(|_| PluginError::InitPanicked)?;
        if status != STATUS_OK {
            return Err(PluginError::InitFailed(status));
        }

        info!(
            "plugin {} initialised ({})",
            descriptor.name,
            if module.is_none() {
                "builtin"
            } else {
                "native module"
            }
        );
        self.instances.push(PluginInstance {
            descriptor,
            _module: module,
            vtable,
            _args: args,
            healthy: AtomicBool::new(true),
        });
        Ok(true)
    }

    pub fn count(&self) -> usize {
        self.instances.len()
    }

    /// Starts every instance, in registration order. Invoked by the scan
    /// thread on its first transition into RUNNING.
    pub fn start_all(&self) {
        for instance in &self.instances {
            instance.lifecycle("start", instance.vtable.start);
        }
    }

    /// Stops every instance, in reverse registration order.
    pub fn stop_all(&self) {
        for instance in self.instances.iter().rev() {
            instance.lifecycle("stop", instance.vtable.stop);
        }
    }

    /// Cleans up every instance, in reverse registration order. The backing
    /// modules unload when the host is dropped.
    pub fn cleanup_all(&self) {
        for instance in self.instances.iter().rev() {
            instance.lifecycle("cleanup", instance.vtable.cleanup);
        }
    }

    /// Runs the `cycle_start` hooks of the instances that export one. The
    /// guard witnesses that the caller (the tick) holds the image lock;
    /// hooks must not take it again.
    pub fn cycle_start(&self, _guard: &ImageGuard) {
        for instance in &self.instances {
            if let Some(hook) = instance.vtable.cycle_start {
                instance.hook("cycle_start", hook);
            }
        }
    }

    /// Runs the `cycle_end` hooks, same contract as [`Self::cycle_start`].
    pub fn cycle_end(&self, _guard: &ImageGuard) {
        for instance in &self.instances {
            if let Some(hook) = instance.vtable.cycle_end {
                instance.hook("cycle_end", hook);
            }
        }
    }
}

fn resolve_vtable(library: &Library, path: &str) -> Result<PluginVTable, PluginError> {
    macro_rules! required {
        ($sym:expr, $name:literal, $ty:ty) => {
            unsafe {
                library
                    .get::<$ty>($sym)
                    .map(|symbol| *symbol)
                    .map_err(|_| PluginError::EntryPointMissing {
                        path: path.to_string(),
                        symbol: $name,
                    })?
            }
        };
    }
    let optional = |symbol: &[u8]| unsafe {
        library
            .get::<PluginCycleFn>(symbol)
            .map(|symbol| *symbol)
            .ok()
    };
    Ok(PluginVTable {
        init: required!(SYM_INIT, "plugin_init", PluginInitFn),
        start: required!(SYM_START, "plugin_start", PluginLifecycleFn),
        stop: required!(SYM_STOP, "plugin_stop", PluginLifecycleFn),
        cleanup: required!(SYM_CLEANUP, "plugin_cleanup", PluginLifecycleFn),
        cycle_start: optional(SYM_CYCLE_START),
        cycle_end: optional(SYM_CYCLE_END),
    })
}

/// Loads a descriptor's env file into the process environment before the
/// plugin initialises. Process-wide by nature; last plugin wins on key
/// collisions.
fn load_env_file(plugin: &str, path: &Path) {
    match plcr_app_config::parse_env_file(path) {
        Ok(values) => {
            for (key, value) in values {
                std::env::set_var(key, value);
            }
        }
        Err(err) => warn!("plugin {plugin}: env file ignored: {err}"),
    }
}
