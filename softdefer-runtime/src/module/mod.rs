//! Component lifecycle: start-of-life and end-of-life entry points.

mod host;
mod registry;

pub use host::{LoadedModules, ModuleHost, ModuleHostBuilder};
pub use registry::{ModuleEntry, MODULES};

use std::fmt;

use config::Config;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::config::module_params;
use crate::error::ModuleError;

/// A component that defers work between its load and unload
///
/// `init` runs at load time with the module's parameters and may schedule
/// work. `exit` runs at unload time and must leave nothing behind: cancel
/// delayed items, drain or flush, then destroy any dedicated pool. If `init`
/// fails, it must release whatever it created before returning; `exit` is
/// not called for a module that failed to load.
///
/// Use `#[deferral_module(name = "...")]` on the impl block to fill in
/// [`NAME`](Self::NAME) and register the module for discovery.
pub trait DeferralModule: Sized + Send + 'static {
    /// Name used in logs and as the module's configuration table.
    const NAME: &'static str;

    type Params: DeserializeOwned + Default + fmt::Debug;

    fn init(params: Self::Params) -> Result<Self, ModuleError>;

    fn exit(self);
}

/// A loaded module with its concrete type erased
pub(crate) trait LoadedModule: Send {
    fn name(&self) -> &'static str;

    fn exit(self: Box<Self>);
}

struct Loaded<M>(M);

impl<M: DeferralModule> LoadedModule for Loaded<M> {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn exit(self: Box<Self>) {
        info!(module = M::NAME, "unloading module");
        self.0.exit();
    }
}

pub(crate) type Loader = fn(&Config) -> Result<Box<dyn LoadedModule>, ModuleError>;

fn load<M: DeferralModule>(config: &Config) -> Result<Box<dyn LoadedModule>, ModuleError> {
    let params = module_params::<M::Params>(config, M::NAME).map_err(|source| ModuleError::Params {
        module: M::NAME,
        source,
    })?;
    info!(module = M::NAME, params = ?params, "loading module");
    let module = M::init(params)?;
    Ok(Box::new(Loaded(module)))
}
