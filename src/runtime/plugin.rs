use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, trace};

use super::function::NativeFn;
use super::{ErrorKind, RuntimeError, RuntimeResult};

/// Resolves exported function names inside one loaded module.
pub trait SymbolTable {
    fn resolve(&self, symbol: &str) -> Option<NativeFn>;
}

/// Opens the module file found for an `import`.
pub trait ModuleLoader {
    fn load(&self, name: &str, path: &Path) -> RuntimeResult<Box<dyn SymbolTable>>;
}

/// Loads shared libraries from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    fn load(&self, name: &str, path: &Path) -> RuntimeResult<Box<dyn SymbolTable>> {
        debug!(plugin = name, path = %path.display(), "loading native module");
        // SAFETY: plugins are built against this crate with the same toolchain.
        let library = unsafe { Library::new(path) }.map_err(|err| {
            RuntimeError::new(
                ErrorKind::Configuration,
                format!("could not load plugin \"{name}\": {err}"),
            )
        })?;
        Ok(Box::new(NativeModule { library }))
    }
}

pub struct NativeModule {
    library: Library,
}

impl SymbolTable for NativeModule {
    fn resolve(&self, symbol: &str) -> Option<NativeFn> {
        // SAFETY: exports use the `NativeFn` signature; the registry keeps the
        // library loaded while the pointer is called.
        unsafe {
            self.library
                .get::<NativeFn>(symbol.as_bytes())
                .ok()
                .map(|sym| *sym)
        }
    }
}

/// In-memory module for embedders that link their filters statically.
#[derive(Clone, Default)]
pub struct StaticModule {
    functions: HashMap<String, NativeFn>,
}

impl StaticModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, func: NativeFn) -> Self {
        self.functions.insert(name.into(), func);
        self
    }
}

impl SymbolTable for StaticModule {
    fn resolve(&self, symbol: &str) -> Option<NativeFn> {
        self.functions.get(symbol).copied()
    }
}

/// Hands out [`StaticModule`]s by plugin name instead of opening files.
#[derive(Clone, Default)]
pub struct StaticLoader {
    modules: HashMap<String, StaticModule>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: impl Into<String>, module: StaticModule) -> Self {
        self.modules.insert(name.into(), module);
        self
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, name: &str, _path: &Path) -> RuntimeResult<Box<dyn SymbolTable>> {
        self.modules
            .get(name)
            .cloned()
            .map(|module| Box::new(module) as Box<dyn SymbolTable>)
            .ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::Configuration,
                    format!("could not load plugin \"{name}\": no such module"),
                )
            })
    }
}

struct Plugin {
    name: String,
    module: Box<dyn SymbolTable>,
}

/// Plugins loaded so far, in import order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name == name)
    }

    pub fn register(&mut self, name: impl Into<String>, module: Box<dyn SymbolTable>) {
        self.plugins.push(Plugin {
            name: name.into(),
            module,
        });
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name.as_str())
    }

    pub fn resolve(&self, plugin: &str, function: &str) -> RuntimeResult<NativeFn> {
        let entry = self
            .plugins
            .iter()
            .find(|p| p.name == plugin)
            .ok_or_else(|| {
                RuntimeError::new(ErrorKind::Name, format!("plugin \"{plugin}\" not loaded"))
            })?;
        trace!(plugin, function, "resolving plugin symbol");
        entry.module.resolve(function).ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::Name,
                format!("function \"{function}\" not found in plugin {plugin}"),
            )
        })
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Plugin(PathBuf),
    Script(PathBuf),
}

/// File a plugin called `name` is loaded from, e.g. `libblur.so`.
pub fn dynamic_lib_filename(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{name}.dylib")
    } else {
        format!("lib{name}.so")
    }
}

/// Finds what `import name` refers to. Exactly one of the plugin library
/// and the script may exist in `dir`.
pub fn locate(dir: &Path, name: &str, script_extension: &str) -> RuntimeResult<ImportTarget> {
    let plugin = dir.join(dynamic_lib_filename(name));
    let script = dir.join(format!("{name}.{script_extension}"));
    match (plugin.is_file(), script.is_file()) {
        (true, false) => Ok(ImportTarget::Plugin(plugin)),
        (false, true) => Ok(ImportTarget::Script(script)),
        (true, true) => Err(RuntimeError::new(
            ErrorKind::Configuration,
            format!(
                "both a script and a plugin with name \"{name}\" exist: rename or remove one of them"
            ),
        )),
        (false, false) => Err(RuntimeError::new(
            ErrorKind::Configuration,
            format!("could not load script or plugin \"{name}\": file not found"),
        )),
    }
}
